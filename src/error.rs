use std::fmt;

impl std::error::Error for TranceError {}

#[derive(Debug, Clone, PartialEq)]
pub enum TranceError {
    /// Jump/separation/count could not be satisfied within the retry cap.
    ConstraintInfeasible { attempts: usize },
    Parse(String),
    StoreCorrupt(String),
    StoreWrite(String),
    PatternIndex { index: usize, len: usize },
    Transport(String),
    Config(String),
}

impl fmt::Display for TranceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TranceError::ConstraintInfeasible { attempts } => {
                write!(f, "Constraint Infeasible: no scale satisfied the constraints after {} attempts", attempts)
            }
            TranceError::Parse(msg) => write!(f, "Parsing Error: {}", msg),
            TranceError::StoreCorrupt(msg) => write!(f, "Store Corrupt: {}", msg),
            TranceError::StoreWrite(msg) => write!(f, "Store Write Error: {}", msg),
            TranceError::PatternIndex { index, len } => {
                write!(f, "Pattern Index Error: index {} out of range for {} stored patterns", index, len)
            }
            TranceError::Transport(msg) => write!(f, "Transport Error: {}", msg),
            TranceError::Config(msg) => write!(f, "Config Error: {}", msg),
        }
    }
}
