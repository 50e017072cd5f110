use rust_decimal::Decimal;
use thiserror::Error;

use crate::lifecycle::TransitionError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("amount must be greater than zero, got {amount}")]
    NonPositiveAmount { amount: Decimal },
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::DomainError;
    use crate::domain::approval::ApprovalStatus;
    use crate::lifecycle::TransitionError;

    #[test]
    fn transition_errors_convert_transparently() {
        let error: DomainError =
            TransitionError::ApprovalAlreadyResolved { status: ApprovalStatus::Approved }.into();
        assert_eq!(error.to_string(), "approval is already resolved as Approved");
    }

    #[test]
    fn amount_error_carries_the_offending_value() {
        let error = DomainError::NonPositiveAmount { amount: Decimal::new(-100, 2) };
        assert_eq!(error.to_string(), "amount must be greater than zero, got -1.00");
    }
}
