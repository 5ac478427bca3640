use serde::{Deserialize, Serialize};

/// Terminal state of an iterative correlation.
///
/// The integer codes are stable and can be exchanged with outer tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReturnStatus {
    /// Increment norm fell below the threshold (`2`).
    Converged,
    /// Iteration budget exhausted (`1`).
    MaxIterations,
    /// Error stopped decreasing late in the run (`-1`).
    DivergedError,
    /// The linear system could not be solved (`-2`).
    SingularMatrix,
    /// The volume change left its admissible range (`-3`).
    DivergedVolume,
}

impl ReturnStatus {
    /// Integer status code.
    pub fn code(self) -> i32 {
        match self {
            Self::Converged => 2,
            Self::MaxIterations => 1,
            Self::DivergedError => -1,
            Self::SingularMatrix => -2,
            Self::DivergedVolume => -3,
        }
    }

    /// Parse an integer status code.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            2 => Some(Self::Converged),
            1 => Some(Self::MaxIterations),
            -1 => Some(Self::DivergedError),
            -2 => Some(Self::SingularMatrix),
            -3 => Some(Self::DivergedVolume),
            _ => None,
        }
    }

    pub fn is_converged(self) -> bool {
        self == Self::Converged
    }
}

impl std::fmt::Display for ReturnStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Converged => "converged",
            Self::MaxIterations => "max iterations",
            Self::DivergedError => "diverging on error",
            Self::SingularMatrix => "singular matrix",
            Self::DivergedVolume => "diverging on volume change",
        };
        write!(f, "{} ({})", name, self.code())
    }
}
