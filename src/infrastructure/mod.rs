pub mod documents;
pub mod pipelines;
