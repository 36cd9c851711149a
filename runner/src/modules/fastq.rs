//! FASTQ fan-out by read count.

use std::ops::Range;

use serde_json::Value;

use crate::core::argument::{Argument, display_value};
use crate::core::error::{MissingOutput, ModuleError, OutputPhase};
use crate::core::module::{ModuleBase, ModuleDef, SplitPathRequest};
use crate::core::platform::PlatformInfo;
use crate::core::splitter::{SplitDescriptor, Splitter, split_ranges};

/// Lines per FASTQ record.
const LINES_PER_READ: u64 = 4;

const DEFAULT_READS_PER_SPLIT: u64 = 1_000_000;

/// Splits single-end (`R1`) or paired (`R1` + `R2`) FASTQ files into chunks
/// of at most `nr_reads` reads each.
///
/// The split plan comes from `total_reads`, so no file is read while the
/// command is generated. A read count that is an exact multiple of
/// `nr_reads` never produces an empty trailing split.
#[derive(Debug)]
pub struct FastqSplitter {
    base: ModuleBase,
    mates: &'static [&'static str],
}

impl FastqSplitter {
    pub fn single_end(id: &str) -> Self {
        Self::with_mates(id, &["R1"])
    }

    pub fn paired(id: &str) -> Self {
        Self::with_mates(id, &["R1", "R2"])
    }

    fn with_mates(id: &str, mates: &'static [&'static str]) -> Self {
        let mut input_keys = mates.to_vec();
        input_keys.extend(["total_reads", "nr_reads", "nr_cpus", "mem"]);
        Self {
            base: ModuleBase::new(id, "fastq_splitter", "FastqSplitter")
                .with_input_keys(&input_keys)
                .with_output_keys(mates)
                .with_req_tools(&[])
                .with_req_resources(&[]),
            mates,
        }
    }
}

fn read_range(split: &SplitDescriptor) -> Option<Range<u64>> {
    let bound = |key: &str| split.params.get(key).and_then(Value::as_u64);
    Some(bound("first_read")?..bound("end_read")?)
}

/// First and last 1-based FASTQ line covered by `reads`.
fn line_range(reads: &Range<u64>) -> Option<(u64, u64)> {
    let first = reads.start.checked_mul(LINES_PER_READ)?.checked_add(1)?;
    let last = reads.end.checked_mul(LINES_PER_READ)?;
    Some((first, last))
}

impl ModuleDef for FastqSplitter {
    fn base(&self) -> &ModuleBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ModuleBase {
        &mut self.base
    }

    fn define_input(&mut self) -> Result<(), ModuleError> {
        for mate in self.mates {
            self.base.add_argument(Argument::new(*mate).mandatory())?;
        }
        self.base
            .add_argument(Argument::new("total_reads").mandatory())?;
        self.base.add_argument(
            Argument::new("nr_reads")
                .mandatory()
                .default_value(DEFAULT_READS_PER_SPLIT),
        )?;
        self.base
            .add_argument(Argument::new("nr_cpus").mandatory().default_value(1))?;
        self.base
            .add_argument(Argument::new("mem").mandatory().default_value(1))
    }
}

impl Splitter for FastqSplitter {
    fn init_split_info(
        &mut self,
        _platform: &dyn PlatformInfo,
    ) -> Result<Vec<SplitDescriptor>, ModuleError> {
        let total_reads = self.base.argument_u64("total_reads")?;
        let nr_reads = self.base.argument_u64("nr_reads")?;
        let ranges = split_ranges(total_reads, nr_reads).ok_or_else(|| {
            ModuleError::invalid_argument(
                self.base.id(),
                "nr_reads",
                "cannot split a FASTQ file by 0 reads",
            )
        })?;

        Ok(ranges
            .into_iter()
            .enumerate()
            .map(|(index, reads)| {
                SplitDescriptor::new(index)
                    .param("first_read", reads.start)
                    .param("end_read", reads.end)
            })
            .collect())
    }

    fn init_output_file_paths(
        &mut self,
        splits: &[SplitDescriptor],
        platform: &dyn PlatformInfo,
    ) -> Result<(), ModuleError> {
        for split in splits {
            for mate in self.mates {
                let extension = format!("{mate}.fastq");
                self.base.generate_split_output_path(
                    platform,
                    mate,
                    SplitPathRequest::new(split.index)
                        .name(split.name.as_deref())
                        .extension(&extension),
                )?;
            }
        }
        Ok(())
    }

    fn define_command(
        &self,
        splits: &[SplitDescriptor],
        _platform: &dyn PlatformInfo,
    ) -> Result<Option<String>, ModuleError> {
        let mut steps = Vec::with_capacity(splits.len() * self.mates.len());
        for split in splits {
            let reads = read_range(split).ok_or_else(|| {
                ModuleError::invalid_argument(
                    self.base.id(),
                    "nr_reads",
                    format!("split {} has no read range", split.index),
                )
            })?;
            let (first_line, last_line) = line_range(&reads).ok_or_else(|| {
                ModuleError::invalid_argument(
                    self.base.id(),
                    "total_reads",
                    format!("reads {reads:?} exceed the addressable FASTQ line count"),
                )
            })?;
            for mate in self.mates {
                let input = display_value(self.base.required_argument(mate)?);
                let output = self.base.output().path(split.index, mate).ok_or_else(|| {
                    ModuleError::MissingOutput {
                        module: self.base.id().to_string(),
                        phase: OutputPhase::Split,
                        missing: vec![MissingOutput {
                            key: (*mate).to_string(),
                            split_index: split.index,
                        }],
                    }
                })?;
                steps.push(format!(
                    "sed -n '{first_line},{last_line}p;{last_line}q' {input} > {} !LOG2!",
                    output.display()
                ));
            }
        }
        if steps.is_empty() {
            return Ok(None);
        }
        Ok(Some(steps.join(" && ")))
    }
}
