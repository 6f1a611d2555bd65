pub mod logger;

pub use logger::{TraceId, annotate_span, child_span, init_logger, root_span, warn_if_slow};
