use std::fmt;

use gwr_core::SourceTag;
use serde::Serialize;
use thiserror::Error;

/// A raw display name that could not be reduced to a stable canonical form.
/// Recovered locally by keeping the cleaned raw name as the canonical key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizationAmbiguity {
    #[error("display name {raw:?} is empty after cleanup")]
    EmptyName { raw: String },
    #[error("display name {raw:?} repeats its only token and no short-name hint is available")]
    RepeatedTokenWithoutHint { raw: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error("duplicate canonical key {key:?} in {side} records: {first_raw:?} and {second_raw:?}")]
    DuplicateCanonicalKey {
        side: SourceTag,
        key: String,
        first_raw: String,
        second_raw: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStage {
    Automatic,
    Override,
}

impl fmt::Display for ResolutionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionStage::Automatic => f.write_str("automatic"),
            ResolutionStage::Override => f.write_str("override"),
        }
    }
}

/// A name present in only one source with no mapping after `stage`. Not
/// fatal: the player is emitted as a zero-filled partial record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("no counterpart for {side} name {name:?} after {stage} pass")]
pub struct UnresolvedName {
    pub name: String,
    pub side: SourceTag,
    pub stage: ResolutionStage,
}
