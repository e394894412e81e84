pub mod stager;

pub use stager::{partial_path, ArtifactStager, StageError, StagedInput};
