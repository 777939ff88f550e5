pub mod assembler;
pub mod classifier;
pub mod markers;
pub mod reducer;

pub use assembler::{ChunkRoute, FenceTransition, Reconciled, SessionAccumulator, SqlSource};
pub use classifier::{Frame, FrameKind, ResultPayload, RowCount, classify_frame};
pub use reducer::{
    CONNECTION_CLOSED_ERROR, Effect, QUERY_FAILED_TEXT, SessionReducer, TRANSPORT_FAILURE_TEXT,
    query_succeeded_text,
};
