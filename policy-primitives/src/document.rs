//! Typed pipeline configuration document model.
//!
//! The model names the paths policies most commonly inspect (`workflows`,
//! `jobs`, `docker.image`) and preserves everything else verbatim in
//! flattened maps, so the evaluator sees the configuration unmodified.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// A pipeline configuration document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default)]
    workflows: Vec<Workflow>,
    #[serde(default)]
    jobs: Vec<Job>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl ConfigDocument {
    /// Creates a document from its workflow and job sequences.
    #[must_use]
    pub fn new(workflows: Vec<Workflow>, jobs: Vec<Job>) -> Self {
        Self {
            workflows,
            jobs,
            extra: Map::new(),
        }
    }

    /// Parses a document from an untyped JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidDocument`] when the value does not
    /// match the expected structure.
    pub fn from_json(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Serializes the document back to an untyped JSON value.
    ///
    /// The round trip through [`ConfigDocument::from_json`] is lossless;
    /// unrecognized keys are carried in the flattened remainder.
    ///
    /// # Panics
    ///
    /// Panics only if serialization of the in-memory model fails, which
    /// cannot happen for these types.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("config document serializes")
    }

    /// Returns the ordered workflow sequence.
    #[must_use]
    pub fn workflows(&self) -> &[Workflow] {
        &self.workflows
    }

    /// Returns the ordered job sequence.
    #[must_use]
    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// Returns config keys outside the typed model.
    #[must_use]
    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }
}

/// A single workflow entry within a configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    name: String,
    #[serde(default)]
    jobs: Vec<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl Workflow {
    /// Creates a workflow referencing jobs by name.
    #[must_use]
    pub fn new(name: impl Into<String>, jobs: Vec<String>) -> Self {
        Self {
            name: name.into(),
            jobs,
            extra: Map::new(),
        }
    }

    /// Returns the workflow name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the names of jobs the workflow runs.
    #[must_use]
    pub fn jobs(&self) -> &[String] {
        &self.jobs
    }
}

/// A single job entry within a configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Job {
    name: String,
    #[serde(default)]
    docker: Vec<DockerSection>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl Job {
    /// Creates a job with the supplied docker sections.
    #[must_use]
    pub fn new(name: impl Into<String>, docker: Vec<DockerSection>) -> Self {
        Self {
            name: name.into(),
            docker,
            extra: Map::new(),
        }
    }

    /// Returns the job name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the docker executor sections declared by the job.
    #[must_use]
    pub fn docker(&self) -> &[DockerSection] {
        &self.docker
    }
}

/// A docker executor entry inside a job.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DockerSection {
    image: String,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl DockerSection {
    /// Creates a docker section for the supplied image reference.
    #[must_use]
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            extra: Map::new(),
        }
    }

    /// Returns the image reference.
    #[must_use]
    pub fn image(&self) -> &str {
        &self.image
    }
}
