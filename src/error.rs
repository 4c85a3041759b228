// 2.0: error taxonomy for the risk engine.
// expected business outcomes (infeasible repayment, risk tiers) are typed values, not errors.
// these variants are for input the engine cannot evaluate.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RiskError {
    #[error("Insufficient data: need {required} observations, have {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("Repayment infeasible: needs {min_days_required} days, limit is {max_days}")]
    InfeasiblePlan { min_days_required: u32, max_days: u32 },

    #[error("Data shape error: {reason}")]
    DataShape { reason: String },

    #[error("Cannot parse column {column} row {row}: {value:?}")]
    Parse {
        column: String,
        row: usize,
        value: String,
    },
}

impl RiskError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        RiskError::InvalidInput {
            reason: reason.into(),
        }
    }

    pub(crate) fn insufficient(required: usize, available: usize) -> Self {
        RiskError::InsufficientData {
            required,
            available,
        }
    }
}

pub type Result<T> = std::result::Result<T, RiskError>;
