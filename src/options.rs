use bitflags::bitflags;

bitflags! {
    /// Generation options, mirroring the bit layout of the original C
    /// library's `wfc_opt*` constants so callers porting configuration
    /// values over do not need to remap them.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct WfcOptions: u32 {
        /// Allow patterns flipped across the row axis (top/bottom mirror).
        const FLIP_V = 1 << 0;
        /// Allow patterns flipped across the column axis (left/right mirror).
        const FLIP_H = 1 << 1;
        /// Allow patterns rotated by 90/180/270 degrees.
        const ROTATE = 1 << 2;
        /// Forbid the wave from wrapping across the row (vertical) edges;
        /// boundary cells are restricted to patterns whose edge flag says
        /// they may legally touch that edge.
        const EDGE_FIX_V = 1 << 3;
        /// Forbid the wave from wrapping across the column (horizontal) edges.
        const EDGE_FIX_H = 1 << 4;
    }
}

impl WfcOptions {
    /// Both flip axes.
    pub const FLIP: WfcOptions = WfcOptions::FLIP_V.union(WfcOptions::FLIP_H);
    /// Both edge-fix axes.
    pub const EDGE_FIX: WfcOptions = WfcOptions::EDGE_FIX_V.union(WfcOptions::EDGE_FIX_H);
}

/// Outcome of initialization or a completed/in-progress run.
///
/// `Failed` is a legitimate terminal value, not an error: a contradiction is
/// something the caller inspects and reacts to (typically by cloning an
/// earlier state and retrying with a different RNG draw), not an exceptional
/// condition. True caller mistakes (bad arguments, calling `blit` on a state
/// that hasn't completed) are reported through [`WfcError`] instead.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Status {
    InProgress,
    Completed,
    Failed,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Status::InProgress)
    }
}

/// Errors a caller can provoke: malformed arguments, or using the API in a
/// sequence the state machine doesn't allow (e.g. blitting before
/// completion).
#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum WfcError {
    #[error("pattern size n must be at least 1")]
    InvalidPatternSize,

    #[error("cell size (bytes per pixel) must be at least 1")]
    InvalidCellSize,

    #[error("source extents must be at least 1x1")]
    InvalidSourceExtents,

    #[error("destination extents must be at least 1x1")]
    InvalidDestinationExtents,

    #[error(
        "pattern size {n} exceeds source extents {src_h}x{src_w} or destination extents {dst_h}x{dst_w}"
    )]
    PatternTooLarge {
        n: usize,
        src_h: usize,
        src_w: usize,
        dst_h: usize,
        dst_w: usize,
    },

    #[error("source buffer length {actual} does not match the expected {expected} bytes")]
    SourceBufferLength { expected: usize, actual: usize },

    #[error("destination buffer length {actual} does not match the expected {expected} bytes")]
    DestinationBufferLength { expected: usize, actual: usize },

    #[error("keep mask length {actual} does not match destination size {expected}")]
    KeepMaskLength { expected: usize, actual: usize },

    #[error("this operation requires a completed state, found {0:?}")]
    NotCompleted(Status),

    #[error("pattern index {index} out of range (pattern count is {count})")]
    PatternIndexOutOfRange { index: usize, count: usize },

    #[error("coordinate ({x}, {y}) out of range for a {width}x{height} destination")]
    CoordinateOutOfRange {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },
}
