//! Variable interpolation for secret paths

use std::collections::HashMap;
use std::env;

/// Source of variables used to expand `$VAR` and `${VAR}` in secret paths.
///
/// Unknown variables are left in place rather than replaced with an empty
/// string, so a typo shows up in the path reported back by Vault.
pub trait ExecutionContext {
    /// Looks up a single variable.
    fn var(&self, name: &str) -> Option<String>;

    /// Expands every variable reference in `template`.
    fn expand(&self, template: &str) -> String {
        shellexpand::env_with_context_no_errors(template, |name| self.var(name)).into_owned()
    }
}

/// A snapshot of environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvContext {
    vars: HashMap<String, String>,
}

impl EnvContext {
    /// Captures the current process environment.
    pub fn from_process() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    pub fn with_vars(vars: HashMap<String, String>) -> Self {
        Self { vars }
    }
}

impl ExecutionContext for EnvContext {
    fn var(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

impl ExecutionContext for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Expands with variables resolved earlier in the run first, then defers
/// to the caller's context.
pub(crate) struct Layered<'a> {
    pub(crate) resolved: &'a HashMap<String, String>,
    pub(crate) base: &'a dyn ExecutionContext,
}

impl ExecutionContext for Layered<'_> {
    fn var(&self, name: &str) -> Option<String> {
        self.resolved
            .get(name)
            .cloned()
            .or_else(|| self.base.var(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_expand_braced_and_bare() {
        let ctx = EnvContext::with_vars(vars(&[("STAGE", "prod"), ("APP", "web")]));
        assert_eq!(ctx.expand("secret/${STAGE}/$APP"), "secret/prod/web");
    }

    #[test]
    fn test_unknown_variables_are_kept() {
        let ctx = EnvContext::default();
        assert_eq!(ctx.expand("secret/${MISSING}/db"), "secret/${MISSING}/db");
        assert_eq!(ctx.expand("not/existing"), "not/existing");
    }

    #[test]
    fn test_layered_prefers_resolved_values() {
        let base = vars(&[("STAGE", "dev"), ("APP", "web")]);
        let resolved = vars(&[("STAGE", "prod")]);
        let layered = Layered {
            resolved: &resolved,
            base: &base,
        };
        assert_eq!(layered.expand("secret/${STAGE}/${APP}"), "secret/prod/web");
        assert_eq!(layered.var("APP").as_deref(), Some("web"));
    }

    #[test]
    fn test_layered_expands_once() {
        let base = vars(&[("STAGE", "prod")]);
        let resolved = vars(&[("TEAM", "a$STAGE")]);
        let layered = Layered {
            resolved: &resolved,
            base: &base,
        };
        assert_eq!(layered.expand("teams/${TEAM}/db"), "teams/a$STAGE/db");
        assert_eq!(layered.expand("teams/$STAGE/db"), "teams/prod/db");
    }
}
