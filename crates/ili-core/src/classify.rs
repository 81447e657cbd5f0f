use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Weld,
    Valve,
    Tee,
    Bend,
    Flange,
    Fitting,
    Casing,
    Marker,
    Launcher,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
#[serde(rename_all = "snake_case")]
pub enum TypeGroup {
    MetalLoss,
    Dent,
    Crack,
    Manufacturing,
    Cluster,
}

/// How a keyword is compared against a normalized label. Short abbreviations
/// only count as whole tokens so that "gw" does not fire inside other words.
#[derive(Debug, Clone, Copy)]
enum Keyword {
    Substring(&'static str),
    Token(&'static str),
}

impl Keyword {
    fn matches(self, label: &str) -> bool {
        match self {
            Self::Substring(needle) => label.contains(needle),
            Self::Token(token) => tokens(label).any(|part| part == token),
        }
    }
}

const TYPE_GROUPS: &[(TypeGroup, &[Keyword])] = &[
    (
        TypeGroup::MetalLoss,
        &[
            Keyword::Substring("metal loss"),
            Keyword::Substring("corrosion"),
            Keyword::Substring("wall loss"),
            Keyword::Substring("external ml"),
            Keyword::Substring("internal ml"),
            Keyword::Substring("pitting"),
            Keyword::Substring("gouge"),
            Keyword::Token("ml"),
        ],
    ),
    (
        TypeGroup::Manufacturing,
        &[
            Keyword::Substring("manufacturing"),
            Keyword::Substring("mill anomaly"),
            Keyword::Substring("lamination"),
            Keyword::Substring("seam weld anomaly"),
            Keyword::Substring("inclusion"),
        ],
    ),
    (
        TypeGroup::Dent,
        &[
            Keyword::Token("dent"),
            Keyword::Substring("deformation"),
            Keyword::Substring("ovality"),
            Keyword::Substring("buckle"),
        ],
    ),
    (
        TypeGroup::Crack,
        &[
            Keyword::Substring("crack"),
            Keyword::Substring("linear indication"),
            Keyword::Token("scc"),
        ],
    ),
    (TypeGroup::Cluster, &[Keyword::Substring("cluster")]),
];

const REFERENCE_KINDS: &[(ReferenceKind, &[Keyword])] = &[
    (
        ReferenceKind::Weld,
        &[
            Keyword::Substring("weld"),
            Keyword::Substring("girth"),
            Keyword::Token("gw"),
        ],
    ),
    (ReferenceKind::Valve, &[Keyword::Substring("valve")]),
    (ReferenceKind::Tee, &[Keyword::Token("tee")]),
    (
        ReferenceKind::Bend,
        &[Keyword::Substring("bend"), Keyword::Substring("elbow")],
    ),
    (ReferenceKind::Flange, &[Keyword::Substring("flange")]),
    (
        ReferenceKind::Fitting,
        &[Keyword::Substring("fitting"), Keyword::Token("tap")],
    ),
    (ReferenceKind::Casing, &[Keyword::Substring("casing")]),
    (
        ReferenceKind::Marker,
        &[Keyword::Substring("marker"), Keyword::Token("agm")],
    ),
    (
        ReferenceKind::Launcher,
        &[Keyword::Substring("launcher"), Keyword::Substring("receiver")],
    ),
];

/// Lowercases, trims and collapses internal whitespace.
pub fn normalize_label(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
}

pub fn compatibility_group(label: &str) -> Option<TypeGroup> {
    let normalized = normalize_label(label);
    TYPE_GROUPS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|keyword| keyword.matches(&normalized)))
        .map(|(group, _)| *group)
}

/// Landmark kind of a label. Anomaly keywords win over landmark keywords, so a
/// "Seam Weld Anomaly" is never treated as an anchor.
pub fn reference_kind(label: &str) -> Option<ReferenceKind> {
    if compatibility_group(label).is_some() {
        return None;
    }

    let normalized = normalize_label(label);
    REFERENCE_KINDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|keyword| keyword.matches(&normalized)))
        .map(|(kind, _)| *kind)
}

pub fn is_reference_type(label: &str) -> bool {
    reference_kind(label).is_some()
}

pub fn labels_equal(left: &str, right: &str) -> bool {
    normalize_label(left) == normalize_label(right)
}

fn tokens(label: &str) -> impl Iterator<Item = &str> {
    label
        .split(|ch: char| !ch.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
}
