use crate::error::TransferError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Represents the balance of a ledger account in minor units.
///
/// A `Balance` may go negative while a unit of work is in progress; the ledger
/// refuses to commit it in that state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Balance(pub i64);

/// Represents a strictly positive amount moved by a debit or a credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Amount(i64);

impl Amount {
    pub fn new(value: i64) -> Result<Self, TransferError> {
        if value > 0 {
            Ok(Self(value))
        } else {
            Err(TransferError::ValidationError(format!(
                "Amount must be positive, got {value}"
            )))
        }
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for Amount {
    type Error = TransferError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for i64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
    }
}

impl Balance {
    pub const ZERO: Self = Self(0);

    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Adds an amount, refusing to wrap around on overflow.
    pub fn checked_add(self, amount: Amount) -> Result<Self, TransferError> {
        self.0
            .checked_add(amount.0)
            .map(Self)
            .ok_or_else(|| TransferError::ValidationError("Balance overflow".to_string()))
    }

    /// Subtracts an amount, refusing to wrap around on underflow.
    pub fn checked_sub(self, amount: Amount) -> Result<Self, TransferError> {
        self.0
            .checked_sub(amount.0)
            .map(Self)
            .ok_or_else(|| TransferError::ValidationError("Balance underflow".to_string()))
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add for Balance {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Balance {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl AddAssign for Balance {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Balance {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl std::iter::Sum for Balance {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, b| acc + b)
    }
}

/// A named ledger row.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct Account {
    /// Unique account name.
    pub name: String,
    pub balance: Balance,
}

impl Account {
    pub fn new(name: impl Into<String>, balance: Balance) -> Self {
        Self {
            name: name.into(),
            balance,
        }
    }

    /// Credits funds to the account.
    pub fn credit(&mut self, amount: Amount) -> Result<(), TransferError> {
        self.balance = self.balance.checked_add(amount)?;
        Ok(())
    }

    /// Debits funds from the account.
    ///
    /// The resulting balance may be negative; it is validated when the owning
    /// unit of work prepares.
    pub fn debit(&mut self, amount: Amount) -> Result<(), TransferError> {
        self.balance = self.balance.checked_sub(amount)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), TransferError> {
        if self.balance.is_negative() {
            Err(TransferError::ValidationError(format!(
                "Account '{}' would have a negative balance ({})",
                self.name, self.balance
            )))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_arithmetic() {
        let b1 = Balance::new(10);
        let b2 = Balance::new(5);
        assert_eq!(b1 + b2, Balance::new(15));
        assert_eq!(b1 - b2, Balance::new(5));
        assert_eq!([b1, b2].into_iter().sum::<Balance>(), Balance::new(15));
    }

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(1).is_ok());
        assert!(matches!(
            Amount::new(0),
            Err(TransferError::ValidationError(_))
        ));
        assert!(matches!(
            Amount::new(-1),
            Err(TransferError::ValidationError(_))
        ));
    }

    #[test]
    fn test_amount_deserialization_rejects_non_positive() {
        assert!(serde_json::from_str::<Amount>("100").is_ok());
        assert!(serde_json::from_str::<Amount>("-5").is_err());
    }

    #[test]
    fn test_account_credit_and_debit() {
        let mut account = Account::new("foo", Balance::new(1000));
        account.debit(Amount::new(100).unwrap()).unwrap();
        assert_eq!(account.balance, Balance::new(900));
        account.credit(Amount::new(250).unwrap()).unwrap();
        assert_eq!(account.balance, Balance::new(1150));
    }

    #[test]
    fn test_account_overdraft_fails_validation() {
        let mut account = Account::new("foo", Balance::new(50));
        account.debit(Amount::new(100).unwrap()).unwrap();
        assert_eq!(account.balance, Balance::new(-50));
        assert!(matches!(
            account.validate(),
            Err(TransferError::ValidationError(_))
        ));
    }

    #[test]
    fn test_balance_overflow_is_rejected() {
        let mut account = Account::new("foo", Balance::new(i64::MAX));
        assert!(account.credit(Amount::new(1).unwrap()).is_err());
        assert_eq!(account.balance, Balance::new(i64::MAX));
    }
}
