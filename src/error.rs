//! The error type shared by the multiscale pipeline.
use std::error::Error;
use std::fmt;

/// The pipeline stage in which a failure was detected.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Stage {
    LocalCorrector,
    CellProblem,
    CoarseAssembly,
    CoarseSolve,
    Reconstruction,
    FineScale,
    Output,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::LocalCorrector => "local corrector",
            Stage::CellProblem => "cell problem",
            Stage::CoarseAssembly => "coarse assembly",
            Stage::CoarseSolve => "coarse solve",
            Stage::Reconstruction => "reconstruction",
            Stage::FineScale => "fine-scale solve",
            Stage::Output => "output",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub enum MsFemError {
    /// Mismatch between configuration, problem metadata and meshes. Not recoverable.
    Config(String),
    /// A validity check on discrete data failed, e.g. non-finite degrees of freedom.
    InvalidState { stage: Stage, message: String },
    /// An iterative solver did not converge within its budget.
    Convergence { stage: Stage, message: String },
    /// Reading or writing persisted data failed.
    Io(String),
}

impl MsFemError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn invalid_state(stage: Stage, message: impl Into<String>) -> Self {
        Self::InvalidState {
            stage,
            message: message.into(),
        }
    }

    pub fn convergence(stage: Stage, message: impl Into<String>) -> Self {
        Self::Convergence {
            stage,
            message: message.into(),
        }
    }

    /// The stage the error was raised in, if it is tied to one.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::InvalidState { stage, .. } | Self::Convergence { stage, .. } => Some(*stage),
            Self::Config(_) | Self::Io(_) => None,
        }
    }
}

impl fmt::Display for MsFemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(message) => write!(f, "Configuration error: {}", message),
            Self::InvalidState { stage, message } => write!(f, "Invalid state during {}: {}", stage, message),
            Self::Convergence { stage, message } => write!(f, "No convergence during {}: {}", stage, message),
            Self::Io(message) => write!(f, "I/O error: {}", message),
        }
    }
}

impl Error for MsFemError {}

impl From<eyre::Report> for MsFemError {
    fn from(report: eyre::Report) -> Self {
        Self::Io(format!("{:#}", report))
    }
}
