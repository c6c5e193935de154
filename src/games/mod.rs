//! Game-domain request pipelines.

pub mod common;
pub mod turtle_soup;
pub mod twentyq;

pub use turtle_soup::TurtlePipeline;
pub use twentyq::TwentyQPipeline;
