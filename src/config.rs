//! Parses the PAM stack-file arguments (`argc`/`argv` as the hook receives
//! them) into the module's own configuration, passing everything it does
//! not recognize through unchanged for the policy script's own `sys.argv`.

use core::PamCode;

/// The module's own configuration, derived from its stack-file arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleConfig {
    /// Dotted Python module name to import as the policy. Required;
    /// without it there is nothing to invoke the hook function on.
    pub module: Option<String>,
    /// Raises this process's own log verbosity. Never affects a policy
    /// script's own logging.
    pub debug: bool,
    /// Overrides the hook's table-derived default return code.
    pub err_return: Option<PamCode>,
    /// Every token verbatim, passed through to the policy as `sys.argv`.
    pub argv: Vec<String>,
}

impl ModuleConfig {
    /// Parses `argv` the way upstream PAM modules parse their stack-file
    /// arguments: `key=value` pairs and bare tokens, order-independent,
    /// unknown tokens kept for the script.
    #[must_use]
    pub fn parse(argv: &[String]) -> Self {
        let mut module = None;
        let mut debug = false;
        let mut err_return = None;

        for token in argv {
            if let Some(value) = token.strip_prefix("module=") {
                module = Some(value.to_string());
            } else if token == "debug" {
                debug = true;
            } else if let Some(value) = token.strip_prefix("err_return=") {
                if let Ok(raw) = value.parse::<i32>() {
                    err_return = Some(PamCode::from_raw(raw));
                }
            } else if module.is_none() && !token.contains('=') {
                // The first bare token that isn't a recognized flag is
                // treated as the policy module name, matching the
                // original's argv-positional convention.
                module = Some(token.clone());
            }
        }

        Self {
            module,
            debug,
            err_return,
            argv: argv.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_module_key_and_debug_flag() {
        let argv = vec!["module=my_policy".to_string(), "debug".to_string()];
        let config = ModuleConfig::parse(&argv);
        assert_eq!(config.module.as_deref(), Some("my_policy"));
        assert!(config.debug);
        assert_eq!(config.err_return, None);
    }

    #[test]
    fn bare_token_is_treated_as_the_module_name() {
        let argv = vec!["my_policy".to_string()];
        let config = ModuleConfig::parse(&argv);
        assert_eq!(config.module.as_deref(), Some("my_policy"));
    }

    #[test]
    fn err_return_overrides_the_hook_default() {
        let argv = vec!["module=my_policy".to_string(), "err_return=7".to_string()];
        let config = ModuleConfig::parse(&argv);
        assert_eq!(config.err_return, Some(PamCode::AuthErr));
    }

    #[test]
    fn unrecognized_tokens_are_kept_in_argv() {
        let argv = vec!["module=my_policy".to_string(), "custom_flag".to_string()];
        let config = ModuleConfig::parse(&argv);
        assert_eq!(config.argv, argv);
    }
}
