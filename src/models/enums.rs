use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(Recurrence {
    Daily => "daily",
});

str_enum!(IntakeStatus {
    Taken => "taken",
    Skipped => "skipped",
});

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn round_trips_known_values() {
        assert_eq!(Recurrence::from_str("daily").unwrap(), Recurrence::Daily);
        assert_eq!(IntakeStatus::Taken.as_str(), "taken");
        assert_eq!(IntakeStatus::from_str("skipped").unwrap(), IntakeStatus::Skipped);
    }

    #[test]
    fn unknown_value_is_invalid_enum() {
        let err = IntakeStatus::from_str("untaken").unwrap_err();
        match err {
            DatabaseError::InvalidEnum { field, value } => {
                assert_eq!(field, "IntakeStatus");
                assert_eq!(value, "untaken");
            }
            other => panic!("Expected InvalidEnum, got: {other}"),
        }
    }
}
