//! Built-in step library.
//!
//! Each module is a thin command formatter over the contracts in
//! [`crate::core`]; [`build`] instantiates one by kind name.

pub mod fastq;
pub mod gatk;
pub mod qc;

use crate::core::error::ModuleError;
use crate::core::step_module::StepModule;

/// Every kind name [`build`] accepts.
pub const KINDS: [&str; 7] = [
    "ParseTrimmomatic",
    "ParseBedtoolsIntersect",
    "FastqSplitter",
    "PairedFastqSplitter",
    "CatVariants",
    "MergeBQSRs",
    "GenomicsDBImport",
];

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("unknown module kind '{kind}' (known: {known})", known = KINDS.join(", "))]
    UnknownKind { kind: String },

    #[error(transparent)]
    Module(#[from] ModuleError),
}

/// Instantiate and initialize the module registered as `kind`.
pub fn build(kind: &str, id: &str) -> Result<StepModule, BuildError> {
    let module = match kind {
        "ParseTrimmomatic" => StepModule::tool(qc::ParseTrimmomatic::new(id))?,
        "ParseBedtoolsIntersect" => StepModule::tool(qc::ParseBedtoolsIntersect::new(id))?,
        "FastqSplitter" => StepModule::splitter(fastq::FastqSplitter::single_end(id))?,
        "PairedFastqSplitter" => StepModule::splitter(fastq::FastqSplitter::paired(id))?,
        "CatVariants" => StepModule::merger(gatk::CatVariants::new(id))?,
        "MergeBQSRs" => StepModule::merger(gatk::MergeBqsrs::new(id))?,
        "GenomicsDBImport" => StepModule::pseudo_merger(gatk::GenomicsDbImport::new(id))?,
        _ => {
            return Err(BuildError::UnknownKind {
                kind: kind.to_string(),
            });
        }
    };
    Ok(module)
}
