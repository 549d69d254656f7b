//! Category vocabularies: raw Spanish tokens to canonical values.

/// Tokens treated as "no value" for every vocabulary.
const MISSING: &[&str] = &["", "na", "nan", "null"];

static GENDER: &[(&str, &str)] = &[("hombre", "male"), ("mujer", "female")];

static ACTIVITY: &[(&str, &str)] = &[
    ("casa", "home"),
    ("trabajo_estudio", "work_or_study"),
    ("frecuente", "other_frequent"),
    ("no_frecuente", "other_non_frequent"),
    ("otros", "other"),
];

static INCOME: &[(&str, &str)] = &[("<10", "<10"), ("10-15", "10-15"), (">15", ">15")];

static AGE: &[(&str, &str)] = &[
    ("0-25", "0-25"),
    ("25-45", "25-45"),
    ("45-65", "45-65"),
    ("65-100", "65-100"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vocabulary {
    Gender,
    Activity,
    Income,
    Age,
}

/// Outcome of translating one raw category token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translation {
    Missing,
    Known(&'static str),
    /// Not in the vocabulary; carried through unchanged.
    Unknown(String),
}

impl Vocabulary {
    fn entries(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Vocabulary::Gender => GENDER,
            Vocabulary::Activity => ACTIVITY,
            Vocabulary::Income => INCOME,
            Vocabulary::Age => AGE,
        }
    }

    pub fn translate(self, raw: &str) -> Translation {
        let token = raw.trim();
        let lowered = token.to_lowercase();
        if MISSING.contains(&lowered.as_str()) {
            return Translation::Missing;
        }
        self.entries()
            .iter()
            .find(|(from, _)| *from == lowered)
            .map(|(_, to)| Translation::Known(to))
            .unwrap_or_else(|| Translation::Unknown(token.to_string()))
    }
}
