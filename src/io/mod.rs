//! Boundaries of a batch run: instance records in, traces and weights out.

pub mod record;
pub mod source;
pub mod trace;

pub use record::{read_weights, write_weights};
pub use source::{load_dataset, load_eval, parse_record, DirSource, FeatureSource, InstanceKey, Loader, Partition};
pub use trace::{LogSink, TraceSink, WriterSink};
