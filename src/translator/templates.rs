//! Template tables for the supported surface grammar
//!
//! Every table is ordered; the first matching entry wins. Intent templates
//! are anchored to the start of the (normalized) input, condition and
//! assignment templates are anchored to the cursor position they are
//! applied at.

use crate::translator::intent::{CompareOp, LikeMode, OperationKind};
use lazy_static::lazy_static;
use regex::Regex;

pub struct IntentTemplate {
    pub kind: OperationKind,
    pub pattern: Regex,
    /// Human-readable grammar, for error messages and docs
    pub grammar: &'static str,
}

lazy_static! {
    pub static ref INTENT_TEMPLATES: Vec<IntentTemplate> = vec![
        IntentTemplate {
            kind: OperationKind::Count,
            pattern: Regex::new(r"(?i)^(?:count|how\s+many|(?:the\s+)?(?:total\s+)?number\s+of)\b").unwrap(),
            grammar: "count <table> | how many <table> | number of <table>",
        },
        IntentTemplate {
            kind: OperationKind::Insert,
            pattern: Regex::new(r"(?i)^(?:insert|add|create)\b").unwrap(),
            grammar: "insert|add|create [a new] <table> [named <value>] [with <column> <value> ...]",
        },
        IntentTemplate {
            kind: OperationKind::Update,
            pattern: Regex::new(r"(?i)^(?:update|change|modify)\b").unwrap(),
            grammar: "update <table> set <column> to <value> [where <condition>]",
        },
        IntentTemplate {
            kind: OperationKind::Delete,
            pattern: Regex::new(r"(?i)^(?:delete|remove|drop)\b").unwrap(),
            grammar: "delete|remove <table> [where <condition>]",
        },
        IntentTemplate {
            kind: OperationKind::Select,
            pattern: Regex::new(r"(?i)^(?:show|get|find|list|display|select|fetch|give|view)\b(?:\s+me\b)?").unwrap(),
            grammar: "show|get|find|list <table> [where <condition>] [order by <column>] [limit <n>]",
        },
    ];
}

/// Kind and verb span of the first intent template matching `text`
pub fn detect_operation(text: &str) -> Option<(OperationKind, usize)> {
    INTENT_TEMPLATES
        .iter()
        .find_map(|template| template.pattern.find(text).map(|m| (template.kind, m.end())))
}

pub fn supported_grammar() -> Vec<&'static str> {
    INTENT_TEMPLATES.iter().map(|t| t.grammar).collect()
}

/// What a matched condition template produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionShape {
    IsNull,
    IsNotNull,
    Compare(CompareOp),
    Like(LikeMode),
    /// `<column> <value>` with no operator word; only valid for known columns
    Implicit,
}

pub struct ConditionTemplate {
    pub shape: ConditionShape,
    pub pattern: Regex,
}

const COLUMN: &str = r"(?:(?:the|a|an|their|its)\s+)?(?P<col>[a-z_][a-z0-9_]*)";
const VALUE: &str = r#"(?P<val>'[^']*'|"[^"]*"|[^\s,]+)"#;

fn condition(shape: ConditionShape, operator: &str) -> ConditionTemplate {
    let pattern = match shape {
        ConditionShape::IsNull | ConditionShape::IsNotNull => format!(r"(?i)^{}\s+(?:{})\b", COLUMN, operator),
        ConditionShape::Implicit => format!(r"(?i)^{}\s+{}", COLUMN, VALUE),
        _ => format!(r"(?i)^{}\s*(?:{})\s*{}", COLUMN, operator, VALUE),
    };
    ConditionTemplate {
        shape,
        pattern: Regex::new(&pattern).unwrap(),
    }
}

lazy_static! {
    /// Condition sub-clauses, most specific first ("is not" before "is")
    pub static ref CONDITION_TEMPLATES: Vec<ConditionTemplate> = vec![
        condition(ConditionShape::IsNotNull, r"is\s+not\s+null|is\s+not\s+empty|is\s+set"),
        condition(ConditionShape::IsNull, r"is\s+null|is\s+empty|is\s+missing"),
        condition(
            ConditionShape::Compare(CompareOp::NotEq),
            r"!=|<>|\s(?:is\s+not|isn't|does\s+not\s+equal|not\s+equal\s+to|not)\s",
        ),
        condition(
            ConditionShape::Compare(CompareOp::Gte),
            r">=|\s(?:is\s+greater\s+than\s+or\s+equal\s+to|greater\s+than\s+or\s+equal\s+to|is\s+at\s+least|at\s+least)\s",
        ),
        condition(
            ConditionShape::Compare(CompareOp::Lte),
            r"<=|\s(?:is\s+less\s+than\s+or\s+equal\s+to|less\s+than\s+or\s+equal\s+to|is\s+at\s+most|at\s+most)\s",
        ),
        condition(
            ConditionShape::Compare(CompareOp::Gt),
            r">|\s(?:is\s+greater\s+than|greater\s+than|is\s+more\s+than|more\s+than|is\s+above|above|is\s+over|over|is\s+after|after|exceeds)\s",
        ),
        condition(
            ConditionShape::Compare(CompareOp::Lt),
            r"<|\s(?:is\s+less\s+than|less\s+than|fewer\s+than|is\s+below|below|is\s+under|under|is\s+before|before)\s",
        ),
        condition(
            ConditionShape::Like(LikeMode::StartsWith),
            r"\s(?:starts\s+with|starting\s+with|begins\s+with|beginning\s+with)\s",
        ),
        condition(
            ConditionShape::Like(LikeMode::EndsWith),
            r"\s(?:ends\s+with|ending\s+with)\s",
        ),
        condition(
            ConditionShape::Like(LikeMode::Contains),
            r"\s(?:contains|containing|includes|including|is\s+like|like|matches|matching)\s",
        ),
        condition(
            ConditionShape::Compare(CompareOp::Eq),
            r"==|=|\s(?:is\s+equal\s+to|equal\s+to|equals|is)\s",
        ),
        condition(ConditionShape::Implicit, ""),
    ];

    /// Words that introduce a condition list
    pub static ref CONDITION_CUE: Regex =
        Regex::new(r"(?i)\b(?:where|whose|with|having|that\s+(?:have|has)|which\s+(?:have|has))\s+").unwrap();

    pub static ref CONNECTIVE: Regex = Regex::new(r"(?i)^\s+(and|or)\s+").unwrap();

    /// `<column> [=|:|is|as|to|of] <value>` inside INSERT/UPDATE value lists
    pub static ref ASSIGNMENT: Regex = Regex::new(
        r#"(?i)^(?:(?:the|a|an)\s+)?(?P<col>[a-z_][a-z0-9_]*)(?:\s*[=:]\s*|\s+(?:is|as|to|of)\s+|\s+)(?P<val>'[^']*'|"[^"]*"|[^\s,]+)"#
    )
    .unwrap();

    pub static ref ASSIGNMENT_SEPARATOR: Regex = Regex::new(r"(?i)^(?:\s*,\s*|\s+and\s+)").unwrap();

    pub static ref VALUES_CUE: Regex = Regex::new(r"(?i)\b(?:with|values|having|containing)\s+").unwrap();

    pub static ref SET_CUE: Regex = Regex::new(r"(?i)\bset\s+").unwrap();

    pub static ref NAMED: Regex = Regex::new(r#"(?i)\b(?:named|called)\s+(?P<val>'[^']*'|"[^"]*"|[^\s,]+)"#).unwrap();

    /// `<table> 5`, `<table> #5`, `<table> number 5`, `<table> id 5` right after the table token
    pub static ref ID_SHORTHAND: Regex = Regex::new(r"(?i)^\s+(?:#\s*|number\s+|no\.?\s*|id\s+)?#?(\d+)\b").unwrap();

    /// Table cue after a preposition
    pub static ref TABLE_PREPOSITION: Regex =
        Regex::new(r"(?i)\b(?:from|into|in|of)\s+(?:(?:the|all|my)\s+)?([a-z_][a-z0-9_]*)").unwrap();

    pub static ref WORD: Regex = Regex::new(r"(?i)\b[a-z_][a-z0-9_]*\b").unwrap();

    pub static ref GROUP_BY: Regex = Regex::new(
        r"(?i)\b(grouped\s+by|group\s+by|broken\s+down\s+by|per|by)\s+(?:(?:the|each)\s+)?([a-z_][a-z0-9_]*)"
    )
    .unwrap();

    pub static ref ORDER_BY: Regex = Regex::new(
        r"(?i)\b(?:order(?:ed)?|sort(?:ed)?)\s+by\s+(?:the\s+)?([a-z_][a-z0-9_]*)(?:\s+(asc|ascending|desc|descending))?\b"
    )
    .unwrap();

    pub static ref LIMIT: Regex = Regex::new(r"(?i)\b(?:limit(?:\s+to)?|top|first)\s+(\d+)\b").unwrap();

    pub static ref LATEST: Regex = Regex::new(r"(?i)\b(?:latest|newest|most\s+recent|last)\s+(\d+)\b").unwrap();
}

/// Relative-time phrases, each with an optional lead-in ("created in the")
pub enum TimePhrase {
    LastN,
    LastUnit,
    Yesterday,
    Today,
}

const TIME_LEAD: &str =
    r"(?:(?:created|added|registered|placed|made|updated|joined)\s+)?(?:(?:in|within|during|over|from|on|since)\s+)?(?:the\s+)?";

lazy_static! {
    pub static ref TIME_TEMPLATES: Vec<(TimePhrase, Regex)> = vec![
        (
            TimePhrase::LastN,
            Regex::new(&format!(r"(?i)\b{}(?:last|past)\s+(\d+)\s+(hours?|days?|weeks?|months?)\b", TIME_LEAD)).unwrap(),
        ),
        (
            TimePhrase::LastUnit,
            Regex::new(&format!(r"(?i)\b{}(?:last|past)\s+(hour|day|week|month)\b", TIME_LEAD)).unwrap(),
        ),
        (
            TimePhrase::Yesterday,
            Regex::new(&format!(r"(?i)\b{}yesterday\b", TIME_LEAD)).unwrap(),
        ),
        (
            TimePhrase::Today,
            Regex::new(&format!(r"(?i)\b{}today\b", TIME_LEAD)).unwrap(),
        ),
    ];
}

/// Words that never name a table or a selected column
pub const FILLER_WORDS: &[&str] = &[
    "a", "all", "an", "and", "any", "are", "as", "by", "each", "every", "for", "from", "in", "into",
    "is", "me", "my", "new", "of", "on", "or", "our", "record", "records", "row", "rows", "some",
    "the", "their", "there", "to", "entries", "entry", "data", "details", "list", "info", "top",
    "first", "last", "latest", "newest", "most", "recent",
];

pub fn is_filler(word: &str) -> bool {
    FILLER_WORDS.iter().any(|f| f.eq_ignore_ascii_case(word))
}
