//! Interceptor hook: rewrite or fake a command right before it is spawned.
//!
//! A [`CommandStarter`](crate::starter::CommandStarter) can carry its own
//! interceptor, which is the form to use when waits run concurrently. Starters
//! without one fall back to the process-wide slot managed by [`set_global`].

use cmdwait_core::CommandDescription;
use std::sync::{Arc, PoisonError, RwLock};

type InterceptFn = dyn Fn(CommandDescription) -> CommandDescription + Send + Sync;

/// A shared `CommandDescription -> CommandDescription` transformation.
#[derive(Clone)]
pub struct Interceptor(Arc<InterceptFn>);

impl Interceptor {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(CommandDescription) -> CommandDescription + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Leaves every command unchanged.
    pub fn identity() -> Self {
        Self::new(|cmd| cmd)
    }

    /// Substitutes `replacement` for whatever command was requested.
    pub fn replace_with(replacement: CommandDescription) -> Self {
        Self::new(move |_| replacement.clone())
    }

    pub fn apply(&self, cmd: CommandDescription) -> CommandDescription {
        (self.0)(cmd)
    }
}

impl Default for Interceptor {
    fn default() -> Self {
        Self::identity()
    }
}

impl std::fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Interceptor(..)")
    }
}

static GLOBAL: RwLock<Option<Interceptor>> = RwLock::new(None);

/// The interceptor currently installed in the process-wide slot.
pub fn global() -> Interceptor {
    GLOBAL
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
        .unwrap_or_default()
}

/// Install `interceptor` process-wide until the returned guard is dropped.
///
/// Only safe to swap while no other wait is spawning commands; concurrent
/// waits should give each starter its own interceptor instead.
#[must_use = "the previous interceptor is restored when the guard drops"]
pub fn set_global(interceptor: Interceptor) -> InterceptorGuard {
    let previous = GLOBAL
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .replace(interceptor);
    InterceptorGuard { previous }
}

/// Put the identity interceptor back in the process-wide slot.
pub fn reset_global() {
    *GLOBAL.write().unwrap_or_else(PoisonError::into_inner) = None;
}

/// Restores the previously installed global interceptor on drop.
#[derive(Debug)]
pub struct InterceptorGuard {
    previous: Option<Interceptor>,
}

impl Drop for InterceptorGuard {
    fn drop(&mut self) {
        *GLOBAL.write().unwrap_or_else(PoisonError::into_inner) = self.previous.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The process-wide slot is exercised in tests/global_interceptor.rs, which
    // runs as its own binary.

    #[test]
    fn identity_keeps_command() {
        let cmd = CommandDescription::new("cf", ["apps"]);
        assert_eq!(Interceptor::identity().apply(cmd.clone()), cmd);
    }

    #[test]
    fn replace_with_ignores_requested_command() {
        let fake = CommandDescription::new("sh", ["-c", "echo OK"]);
        let interceptor = Interceptor::replace_with(fake.clone());
        assert_eq!(
            interceptor.apply(CommandDescription::new("cf", ["auth", "u", "p"])),
            fake
        );
    }

    #[test]
    fn custom_interceptor_rewrites_executable() {
        let interceptor = Interceptor::new(|cmd| {
            if cmd.executable() == "cf" {
                CommandDescription::new("cf8", cmd.args().iter().cloned())
            } else {
                cmd
            }
        });
        let out = interceptor.apply(CommandDescription::new("cf", ["push", "app"]));
        assert_eq!(out.argv(), vec!["cf8", "push", "app"]);
        let untouched = interceptor.apply(CommandDescription::new("curl", ["-s"]));
        assert_eq!(untouched.executable(), "curl");
    }
}
