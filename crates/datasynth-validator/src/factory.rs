//! The two validator profiles

use datasynth_schema::Dialect;

use crate::backend::DialectValidator;
use crate::flags::{ValidatorFlags, class_label_for};

/// Caller-facing validation options.
#[derive(Debug, Clone, Default)]
pub struct ValidateOptions {
    pub validate_formats: bool,
    pub discriminator: bool,
    /// Pinned decimal precision for the rational `multipleOf` fallback.
    pub multiple_of_precision: Option<u32>,
}

/// The Source validator: the input schema's dialect, tolerant profile.
///
/// No coercion, no defaults, no removal; union types allowed; unicode
/// regexes on.
#[must_use]
pub fn source_validator(dialect: Dialect, opts: &ValidateOptions) -> DialectValidator {
    DialectValidator::new(
        dialect,
        ValidatorFlags {
            class_label: class_label_for(dialect).to_string(),
            strict_schema: false,
            strict_types: false,
            allow_union_types: true,
            unicode_regexp: true,
            validate_formats: opts.validate_formats,
            discriminator: opts.discriminator,
            multiple_of_precision: opts.multiple_of_precision,
            coerce_types: false,
            use_defaults: false,
            remove_additional: false,
            formats_plugin_installed: opts.validate_formats,
        },
    )
}

/// The Planning validator: always the newest dialect, strict profile.
#[must_use]
pub fn planning_validator(opts: &ValidateOptions) -> DialectValidator {
    DialectValidator::new(
        Dialect::NEWEST,
        ValidatorFlags {
            class_label: class_label_for(Dialect::NEWEST).to_string(),
            strict_schema: true,
            strict_types: true,
            allow_union_types: true,
            unicode_regexp: true,
            validate_formats: opts.validate_formats,
            discriminator: opts.discriminator,
            multiple_of_precision: opts.multiple_of_precision,
            coerce_types: false,
            use_defaults: false,
            remove_additional: false,
            formats_plugin_installed: opts.validate_formats,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Validator;

    #[test]
    fn test_source_profile() {
        let v = source_validator(Dialect::Draft7, &ValidateOptions::default());
        let flags = v.options();
        assert_eq!(flags.class_label, "Ajv");
        assert!(!flags.strict_schema);
        assert!(flags.allow_union_types);
        assert!(flags.unicode_regexp);
        assert!(!flags.coerce_types && !flags.use_defaults && !flags.remove_additional);
    }

    #[test]
    fn test_planning_profile_is_newest_and_strict() {
        let v = planning_validator(&ValidateOptions::default());
        let flags = v.options();
        assert_eq!(flags.class_label, "Ajv2020");
        assert!(flags.strict_schema);
        assert!(flags.strict_types);
        assert_eq!(v.dialect(), Dialect::Draft2020);
    }
}
