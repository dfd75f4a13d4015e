//! Remote document collections and tax period codes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Detail endpoints of the e-invoice portal.
///
/// Each collection has its own `view` path and a status filter that is sent
/// with every detail request of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentCollection {
    OutputInvoice,
    InputInvoice,
    OutputReturn,
    InputReturn,
}

impl DocumentCollection {
    pub const ALL: [Self; 4] = [
        Self::OutputInvoice,
        Self::InputInvoice,
        Self::OutputReturn,
        Self::InputReturn,
    ];

    /// Path of the per-record detail endpoint, relative to the portal base URL.
    pub fn detail_path(self) -> &'static str {
        match self {
            Self::OutputInvoice => "/einvoiceportal/api/outputinvoice/view",
            Self::InputInvoice => "/einvoiceportal/api/inputinvoice/view",
            Self::OutputReturn => "/einvoiceportal/api/outputreturn/view",
            Self::InputReturn => "/einvoiceportal/api/inputreturn/view",
        }
    }

    /// Value of the `EinvoiceVATStatus` field. Output documents are queried
    /// with `VAT_VAT`, input documents with an empty filter.
    pub fn status_filter(self) -> &'static str {
        match self {
            Self::OutputInvoice | Self::OutputReturn => "VAT_VAT",
            Self::InputInvoice | Self::InputReturn => "",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OutputInvoice => "output-invoice",
            Self::InputInvoice => "input-invoice",
            Self::OutputReturn => "output-return",
            Self::InputReturn => "input-return",
        }
    }
}

impl fmt::Display for DocumentCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentCollection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("Unknown document collection: {s}"))
    }
}

/// Monthly tax period as the portal encodes it (`TD.00701` .. `TD.00712`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaxPeriod {
    month: u8,
    year: i32,
}

const PERIOD_CODE_PREFIX: &str = "TD.007";

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

impl TaxPeriod {
    /// Returns `None` unless `month` is within 1..=12.
    pub fn new(month: u8, year: i32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { month, year })
    }

    /// Parses a portal period code such as `TD.00709`. Trailing characters
    /// after the eight-character code are ignored, like the portal does.
    pub fn from_code(code: &str, year: i32) -> Option<Self> {
        let month = code
            .get(..8)?
            .strip_prefix(PERIOD_CODE_PREFIX)?
            .parse::<u8>()
            .ok()?;
        Self::new(month, year)
    }

    /// Parses an English month name ("September").
    pub fn from_month_name(name: &str, year: i32) -> Option<Self> {
        let index = MONTH_NAMES
            .iter()
            .position(|m| m.eq_ignore_ascii_case(name.trim()))?;
        Self::new(u8::try_from(index + 1).ok()?, year)
    }

    pub fn code(&self) -> String {
        format!("{PERIOD_CODE_PREFIX}{:02}", self.month)
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month_name(&self) -> &'static str {
        MONTH_NAMES[usize::from(self.month - 1)]
    }
}

impl fmt::Display for TaxPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.month_name(), self.year)
    }
}
