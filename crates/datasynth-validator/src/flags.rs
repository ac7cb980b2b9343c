//! Validator option flags
//!
//! A tagged record the parity gate reads by name. The class labels keep the
//! historical validator-class identifiers; they are declared strings, part
//! of the external contract.

use serde::{Deserialize, Serialize};

use datasynth_schema::Dialect;

/// Option flags of one validator instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorFlags {
    /// `Ajv` | `Ajv2019` | `Ajv2020` | `ajv-draft-04`.
    #[serde(rename = "classLabel")]
    pub class_label: String,
    #[serde(rename = "strictSchema")]
    pub strict_schema: bool,
    #[serde(rename = "strictTypes")]
    pub strict_types: bool,
    #[serde(rename = "allowUnionTypes")]
    pub allow_union_types: bool,
    #[serde(rename = "unicodeRegExp")]
    pub unicode_regexp: bool,
    #[serde(rename = "validateFormats")]
    pub validate_formats: bool,
    pub discriminator: bool,
    #[serde(rename = "multipleOfPrecision", skip_serializing_if = "Option::is_none")]
    pub multiple_of_precision: Option<u32>,
    #[serde(rename = "coerceTypes")]
    pub coerce_types: bool,
    #[serde(rename = "useDefaults")]
    pub use_defaults: bool,
    #[serde(rename = "removeAdditional")]
    pub remove_additional: bool,
    #[serde(rename = "formatsPluginInstalled")]
    pub formats_plugin_installed: bool,
}

/// The class label a dialect's validator reports.
#[must_use]
pub const fn class_label_for(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Draft4 => "ajv-draft-04",
        Dialect::Draft7 => "Ajv",
        Dialect::Draft2019 => "Ajv2019",
        Dialect::Draft2020 => "Ajv2020",
    }
}
