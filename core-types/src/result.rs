// Copyright (c) James Kassemi, SC, US. All rights reserved.

/// Outcome of validating a load event against the committed state.  At most
/// one of `skip` and `fail` is set; neither means the event passed and was
/// (or may be) applied.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub skip: bool,
    pub fail: bool,
    pub message: Option<String>,
}

impl ValidationResult {
    pub fn pass() -> Self {
        Self::default()
    }

    pub fn skip() -> Self {
        Self {
            skip: true,
            ..Self::default()
        }
    }

    pub fn skip_with(message: impl Into<String>) -> Self {
        Self {
            skip: true,
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            fail: true,
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn is_pass(&self) -> bool {
        !self.skip && !self.fail
    }
}
