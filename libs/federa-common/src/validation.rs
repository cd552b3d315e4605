use std::ops::Deref;

/// A configuration that went through its `validate()` step.
#[derive(Debug, Clone)]
pub struct Valid<C>(C);

#[derive(Debug, thiserror::Error)]
#[error("validation error:\n- {}", errors.join("\n- "))]
pub struct ValidationError<T> {
    pub errors:   Vec<String>,
    pub rejected: Box<T>,
}

/// Implemented by configurations; `check` lists every problem found.
pub trait Validate: Sized {
    fn check(&self) -> Vec<String>;

    fn validate(self) -> Result<Valid<Self>, ValidationError<Self>> {
        let errors = self.check();
        if errors.is_empty() {
            Ok(Valid(self))
        } else {
            Err(ValidationError {
                errors,
                rejected: Box::new(self),
            })
        }
    }
}

impl<C> Valid<C> {
    pub fn into_inner(self) -> C {
        self.0
    }
}

impl<C> Deref for Valid<C> {
    type Target = C;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<C> Default for Valid<C>
where
    C: Validate + Default,
{
    /// Panics if the default configuration of `C` is invalid; every config in
    /// this workspace has a test guarding against that.
    fn default() -> Self {
        match C::default().validate() {
            Ok(valid) => valid,
            Err(e) => panic!("default configuration is invalid: {}", e.errors.join("; ")),
        }
    }
}
