//! Clause extraction over a claimable working buffer
//!
//! Each extractor blanks out the span it consumed, so extractors applied
//! later in the fixed precedence order (WHERE, GROUP BY, ORDER BY, LIMIT)
//! never see text an earlier one already claimed.

use crate::error::{QueryError, Result};
use crate::schema::SchemaDescription;
use crate::translator::inflect;
use crate::translator::intent::{
    Assignment, CompareOp, Connective, Filter, Literal, OrderBy, Predicate,
};
use crate::translator::dialect::{TimeUnit, TimeWindow};
use crate::translator::templates::{
    is_filler, ConditionShape, TimePhrase, ASSIGNMENT, ASSIGNMENT_SEPARATOR, CONDITION_CUE,
    CONDITION_TEMPLATES, CONNECTIVE, GROUP_BY, ID_SHORTHAND, LATEST, LIMIT, NAMED, ORDER_BY,
    SET_CUE, TABLE_PREPOSITION, TIME_TEMPLATES, VALUES_CUE, WORD,
};
use std::ops::Range;

/// Normalized input with claimed spans replaced by spaces (byte offsets stay stable)
pub struct Workspace {
    text: String,
}

impl Workspace {
    pub fn new(text: &str) -> Self {
        Self { text: text.to_string() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn claim(&mut self, range: Range<usize>) {
        let blank = " ".repeat(range.len());
        self.text.replace_range(range, &blank);
    }

    /// Unclaimed words after `from`
    pub fn remaining_words(&self, from: usize) -> Vec<String> {
        WORD.find_iter(&self.text[from..]).map(|m| m.as_str().to_lowercase()).collect()
    }
}

/// Table the statement targets, and whether the schema knows it
pub struct TableContext<'a> {
    pub schema: &'a SchemaDescription,
    pub table: String,
    pub in_schema: bool,
}

impl<'a> TableContext<'a> {
    /// Catalog spelling of `raw`; fails closed for unknown columns of known tables
    pub fn resolve_column(&self, raw: &str) -> Result<String> {
        if !self.in_schema {
            return Ok(raw.to_lowercase());
        }
        self.schema
            .find_column(&self.table, raw)
            .map(|c| c.to_string())
            .ok_or_else(|| QueryError::UnresolvedColumn {
                table: self.table.clone(),
                column: raw.to_string(),
            })
    }

    pub fn known_column(&self, raw: &str) -> Option<String> {
        if !self.in_schema {
            return None;
        }
        self.schema.find_column(&self.table, raw).map(|c| c.to_string())
    }

    pub fn has_id_column(&self) -> bool {
        !self.in_schema || self.known_column("id").is_some()
    }
}

/// First relative-time phrase in the text.
///
/// A "last N units" phrase whose N does not fit the window fails instead of
/// dropping the filter.
pub fn extract_time_window(ws: &mut Workspace) -> Result<Option<TimeWindow>> {
    for (phrase, pattern) in TIME_TEMPLATES.iter() {
        let Some(caps) = pattern.captures(ws.text()) else {
            continue;
        };
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let span = whole.range();
        let matched = whole.as_str().trim().to_string();
        let out_of_range = || QueryError::UnrecognizedIntent { text: matched.clone() };

        let window = match phrase {
            TimePhrase::LastN => {
                let amount: u32 = caps
                    .get(1)
                    .and_then(|m| m.as_str().parse().ok())
                    .ok_or_else(out_of_range)?;
                let unit_word = caps.get(2).map(|m| m.as_str().to_lowercase()).unwrap_or_default();
                if unit_word.starts_with("week") {
                    let days = amount.checked_mul(7).ok_or_else(out_of_range)?;
                    TimeWindow::Last { amount: days, unit: TimeUnit::Day }
                } else {
                    let Some(unit) = TimeUnit::parse(&unit_word) else {
                        continue;
                    };
                    TimeWindow::Last { amount, unit }
                }
            }
            TimePhrase::LastUnit => match caps.get(1).map(|m| m.as_str().to_lowercase()).as_deref() {
                Some("week") => TimeWindow::Last { amount: 7, unit: TimeUnit::Day },
                Some(other) => match TimeUnit::parse(other) {
                    Some(unit) => TimeWindow::Last { amount: 1, unit },
                    None => continue,
                },
                None => continue,
            },
            TimePhrase::Yesterday => TimeWindow::Yesterday,
            TimePhrase::Today => TimeWindow::Today,
        };

        ws.claim(span);
        return Ok(Some(window));
    }
    Ok(None)
}

/// A table reference found in the text
pub struct TableMatch {
    pub name: String,
    pub in_schema: bool,
    pub span: Range<usize>,
}

/// Resolve the target table.
///
/// Candidates come from preposition cues, then the token after the leading
/// verb. Each candidate is tried literally, pluralized, then singularized
/// against the schema. Failing that, any word naming a schema table is
/// used; failing that, the first candidate is returned unresolved.
pub fn resolve_table(ws: &Workspace, verb_end: usize, schema: &SchemaDescription) -> Option<TableMatch> {
    let text = ws.text();
    let mut candidates: Vec<(String, Range<usize>)> = Vec::new();

    for caps in TABLE_PREPOSITION.captures_iter(text) {
        if let (Some(whole), Some(word)) = (caps.get(0), caps.get(1)) {
            if !is_filler(word.as_str()) {
                candidates.push((word.as_str().to_string(), whole.range()));
            }
        }
    }

    if verb_end > 0 {
        if let Some(word) = WORD.find_iter(&text[verb_end..]).find(|w| !is_filler(w.as_str())) {
            let range = verb_end + word.start()..verb_end + word.end();
            candidates.push((word.as_str().to_string(), range));
        }
    }

    for (word, span) in &candidates {
        if let Some(name) = lookup_table(schema, word) {
            return Some(TableMatch { name, in_schema: true, span: span.clone() });
        }
    }

    for word in WORD.find_iter(text) {
        if is_filler(word.as_str()) {
            continue;
        }
        if let Some(name) = lookup_table(schema, word.as_str()) {
            return Some(TableMatch { name, in_schema: true, span: word.range() });
        }
    }

    candidates.into_iter().next().map(|(word, span)| TableMatch {
        name: word.to_lowercase(),
        in_schema: false,
        span,
    })
}

fn lookup_table(schema: &SchemaDescription, word: &str) -> Option<String> {
    inflect::candidates(&word.to_lowercase())
        .iter()
        .find_map(|form| schema.find_table(form).map(|(name, _)| name.to_string()))
}

/// `user 5`, `order #12` directly after the table token
pub fn extract_id_shorthand(ws: &mut Workspace, table_end: usize, ctx: &TableContext) -> Option<Predicate> {
    if !ctx.has_id_column() {
        return None;
    }
    let caps = ID_SHORTHAND.captures(&ws.text()[table_end..])?;
    let whole = caps.get(0)?.range();
    let id = caps.get(1)?.as_str().to_string();
    ws.claim(table_end + whole.start..table_end + whole.end);

    let column = ctx.known_column("id").unwrap_or_else(|| "id".to_string());
    Some(Predicate::Compare { column, op: CompareOp::Eq, value: Literal::Number(id) })
}

/// All condition chains introduced by a cue word, AND-joined
pub fn extract_conditions(ws: &mut Workspace, ctx: &TableContext, filter: &mut Filter) -> Result<()> {
    let mut search_from = 0;
    loop {
        let Some((cue_start, cue_end)) = CONDITION_CUE.find_at(ws.text(), search_from).map(|m| (m.start(), m.end()))
        else {
            return Ok(());
        };
        let (chain, end) = parse_condition_chain(ws.text(), cue_end, ctx)?;

        if chain.is_empty() {
            search_from = cue_end;
            continue;
        }

        if chain.iter().any(|(c, _)| *c == Connective::Or) {
            let mut group = Filter::default();
            for (connective, predicate) in chain {
                group.push(connective, predicate);
            }
            filter.push(Connective::And, Predicate::Group(group));
        } else {
            for (_, predicate) in chain {
                filter.push(Connective::And, predicate);
            }
        }
        ws.claim(cue_start..end);
        search_from = end;
    }
}

fn parse_condition_chain(
    text: &str,
    start: usize,
    ctx: &TableContext,
) -> Result<(Vec<(Connective, Predicate)>, usize)> {
    let mut terms = Vec::new();
    let mut pos = start;
    let mut connective = Connective::And;

    loop {
        let Some((predicate, len)) = parse_condition(&text[pos..], ctx)? else {
            break;
        };
        terms.push((connective, predicate));
        pos += len;

        let Some(caps) = CONNECTIVE.captures(&text[pos..]) else {
            break;
        };
        let next = pos + caps.get(0).map(|m| m.end()).unwrap_or(0);
        if parse_condition(&text[next..], ctx)?.is_none() {
            break;
        }
        connective = match caps.get(1).map(|m| m.as_str().to_lowercase()).as_deref() {
            Some("or") => Connective::Or,
            _ => Connective::And,
        };
        pos = next;
    }

    Ok((terms, pos))
}

const KEYWORD_VALUES: &[&str] = &["and", "or", "order", "ordered", "sorted", "sort", "group", "grouped", "limit", "by"];

fn parse_condition(text: &str, ctx: &TableContext) -> Result<Option<(Predicate, usize)>> {
    for template in CONDITION_TEMPLATES.iter() {
        let Some(caps) = template.pattern.captures(text) else {
            continue;
        };
        let len = caps.get(0).map(|m| m.end()).unwrap_or(0);
        let raw_column = caps.name("col").map(|m| m.as_str()).unwrap_or_default();
        if is_filler(raw_column) {
            continue;
        }
        let raw_value = caps
            .name("val")
            .map(|m| m.as_str().trim_end_matches(['.', '?', '!', ';']))
            .unwrap_or_default();

        let predicate = match template.shape {
            ConditionShape::Implicit => {
                let Some(column) = ctx.known_column(raw_column) else {
                    continue;
                };
                if KEYWORD_VALUES.iter().any(|k| k.eq_ignore_ascii_case(raw_value)) {
                    continue;
                }
                equality(column, raw_value)
            }
            ConditionShape::IsNull => Predicate::IsNull { column: ctx.resolve_column(raw_column)?, negated: false },
            ConditionShape::IsNotNull => Predicate::IsNull { column: ctx.resolve_column(raw_column)?, negated: true },
            ConditionShape::Compare(CompareOp::Eq) => equality(ctx.resolve_column(raw_column)?, raw_value),
            ConditionShape::Compare(CompareOp::NotEq) if raw_value.eq_ignore_ascii_case("null") => {
                Predicate::IsNull { column: ctx.resolve_column(raw_column)?, negated: true }
            }
            ConditionShape::Compare(op) => Predicate::Compare {
                column: ctx.resolve_column(raw_column)?,
                op,
                value: Literal::parse(raw_value),
            },
            ConditionShape::Like(mode) => {
                let pattern = match Literal::parse(raw_value) {
                    Literal::Text(s) | Literal::Number(s) => s,
                    Literal::Boolean(b) => b.to_string(),
                };
                Predicate::Like { column: ctx.resolve_column(raw_column)?, mode, pattern }
            }
        };
        return Ok(Some((predicate, len)));
    }
    Ok(None)
}

fn equality(column: String, raw_value: &str) -> Predicate {
    if raw_value.eq_ignore_ascii_case("null") {
        Predicate::IsNull { column, negated: false }
    } else {
        Predicate::Compare { column, op: CompareOp::Eq, value: Literal::parse(raw_value) }
    }
}

/// Value list for INSERT: `named X`, then `with a 1 and b 2`, else pairs right after the table
pub fn extract_insert_values(ws: &mut Workspace, table_end: usize, ctx: &TableContext) -> Result<Vec<Assignment>> {
    let mut values = Vec::new();

    if let Some(caps) = NAMED.captures(ws.text()) {
        let span = caps.get(0).map(|m| m.range());
        let value = caps.name("val").map(|m| m.as_str().to_string());
        if let (Some(span), Some(value)) = (span, value) {
            if let Some(column) = ctx.known_column("name").or_else(|| (!ctx.in_schema).then(|| "name".to_string())) {
                values.push(Assignment { column, value: Literal::parse(&value) });
                ws.claim(span);
            }
        }
    }

    let start = match VALUES_CUE.find(ws.text()) {
        Some(cue) => Some((cue.start(), cue.end())),
        None if table_end <= ws.text().len() => {
            let offset = ws.text()[table_end..].len() - ws.text()[table_end..].trim_start().len();
            Some((table_end, table_end + offset))
        }
        None => None,
    };

    if let Some((claim_from, chain_start)) = start {
        let (assignments, end) = parse_assignments(ws.text(), chain_start, ctx)?;
        if !assignments.is_empty() {
            ws.claim(claim_from..end);
            for assignment in assignments {
                if !values.iter().any(|v: &Assignment| v.column == assignment.column) {
                    values.push(assignment);
                }
            }
        }
    }

    Ok(values)
}

/// `set a to 1 and b to 2` for UPDATE
pub fn extract_set_clause(ws: &mut Workspace, ctx: &TableContext) -> Result<Vec<Assignment>> {
    let Some(cue) = SET_CUE.find(ws.text()).map(|m| m.range()) else {
        return Ok(Vec::new());
    };
    let (assignments, end) = parse_assignments(ws.text(), cue.end, ctx)?;
    if !assignments.is_empty() {
        ws.claim(cue.start..end);
    }
    Ok(assignments)
}

fn parse_assignments(text: &str, start: usize, ctx: &TableContext) -> Result<(Vec<Assignment>, usize)> {
    let mut assignments = Vec::new();
    let mut pos = start;

    while let Some(caps) = ASSIGNMENT.captures(&text[pos..]) {
        let raw_column = caps.name("col").map(|m| m.as_str()).unwrap_or_default();
        let raw_value = caps.name("val").map(|m| m.as_str()).unwrap_or_default();
        if is_filler(raw_column) || raw_column.eq_ignore_ascii_case("where") {
            break;
        }
        assignments.push(Assignment {
            column: ctx.resolve_column(raw_column)?,
            value: Literal::parse(raw_value.trim_end_matches(['.', '?', '!', ';'])),
        });
        pos += caps.get(0).map(|m| m.end()).unwrap_or(0);

        match ASSIGNMENT_SEPARATOR.find(&text[pos..]) {
            Some(sep) if ASSIGNMENT.is_match(&text[pos + sep.end()..]) => pos += sep.end(),
            _ => break,
        }
    }

    Ok((assignments, pos))
}

const ORDER_WORDS: &[&str] = &["order", "ordered", "sort", "sorted", "sorts"];

/// GROUP BY; bare `by`/`per` only when `allow_bare_by` (COUNT queries)
pub fn extract_group_by(ws: &mut Workspace, ctx: &TableContext, allow_bare_by: bool) -> Result<Option<String>> {
    let mut found = None;
    for caps in GROUP_BY.captures_iter(ws.text()) {
        let (Some(whole), Some(keyword), Some(column)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let keyword = keyword.as_str().to_lowercase();
        let bare = keyword == "by" || keyword == "per";
        if bare && !allow_bare_by {
            continue;
        }
        if keyword == "by" {
            let previous = ws.text()[..whole.start()].split_whitespace().last().unwrap_or("");
            if ORDER_WORDS.iter().any(|w| w.eq_ignore_ascii_case(previous)) {
                continue;
            }
        }
        found = Some((whole.range(), column.as_str().to_string()));
        break;
    }

    match found {
        Some((span, raw)) => {
            let column = ctx.resolve_column(&raw)?;
            ws.claim(span);
            Ok(Some(column))
        }
        None => Ok(None),
    }
}

/// ORDER BY; `count` is accepted as the COUNT alias
pub fn extract_order_by(ws: &mut Workspace, ctx: &TableContext, allow_count_alias: bool) -> Result<Option<OrderBy>> {
    let Some(caps) = ORDER_BY.captures(ws.text()) else {
        return Ok(None);
    };
    let span = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
    let raw = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    let descending = caps
        .get(2)
        .map(|m| m.as_str().to_lowercase().starts_with("desc"))
        .unwrap_or(false);

    let column = if allow_count_alias && raw.eq_ignore_ascii_case("count") {
        "count".to_string()
    } else {
        ctx.resolve_column(raw)?
    };
    ws.claim(span);
    Ok(Some(OrderBy { column, descending }))
}

/// `limit N` / `top N` / `first N`
pub fn extract_limit(ws: &mut Workspace) -> Option<u64> {
    let caps = LIMIT.captures(ws.text())?;
    let span = caps.get(0)?.range();
    let limit = caps.get(1)?.as_str().parse().ok()?;
    ws.claim(span);
    Some(limit)
}

/// `latest N` / `newest N` / `most recent N`
pub fn extract_latest(ws: &mut Workspace) -> Option<u64> {
    let caps = LATEST.captures(ws.text())?;
    let span = caps.get(0)?.range();
    let limit = caps.get(1)?.as_str().parse().ok()?;
    ws.claim(span);
    Some(limit)
}

/// Explicit SELECT column list from whatever text is left after the verb
pub fn extract_columns(ws: &Workspace, verb_end: usize, ctx: &TableContext) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for word in ws.remaining_words(verb_end) {
        if is_filler(&word) {
            continue;
        }
        if let Some(column) = ctx.known_column(&word) {
            if !columns.contains(&column) {
                columns.push(column);
            }
        }
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnDescriptor;
    use crate::translator::dialect::SqlDialect;

    fn schema() -> SchemaDescription {
        SchemaDescription::new()
            .with_table(
                "users",
                vec![
                    ColumnDescriptor::new("id", "integer").primary_key(),
                    ColumnDescriptor::new("name", "text"),
                    ColumnDescriptor::new("email", "text"),
                    ColumnDescriptor::new("age", "integer"),
                    ColumnDescriptor::new("status", "text"),
                    ColumnDescriptor::new("created_at", "timestamp"),
                ],
            )
            .with_table("categories", vec![ColumnDescriptor::new("id", "integer")])
    }

    fn ctx(schema: &SchemaDescription) -> TableContext<'_> {
        TableContext { schema, table: "users".to_string(), in_schema: true }
    }

    #[test]
    fn test_claim_keeps_offsets() {
        let mut ws = Workspace::new("show users today");
        ws.claim(11..16);
        assert_eq!(ws.text(), "show users      ");
        assert_eq!(ws.remaining_words(5), vec!["users"]);
    }

    #[test]
    fn test_resolve_table_prefers_preposition() {
        let schema = schema();
        let ws = Workspace::new("show name and email from users");
        let found = resolve_table(&ws, 4, &schema).unwrap();
        assert_eq!(found.name, "users");
        assert!(found.in_schema);
        assert_eq!(&ws.text()[found.span], "from users");
    }

    #[test]
    fn test_resolve_table_inflects() {
        let schema = schema();
        let ws = Workspace::new("delete user 5");
        assert_eq!(resolve_table(&ws, 6, &schema).unwrap().name, "users");

        let ws = Workspace::new("list category");
        assert_eq!(resolve_table(&ws, 4, &schema).unwrap().name, "categories");
    }

    #[test]
    fn test_resolve_table_literal_fallback() {
        let schema = schema();
        let ws = Workspace::new("show invoices");
        let found = resolve_table(&ws, 4, &schema).unwrap();
        assert_eq!(found.name, "invoices");
        assert!(!found.in_schema);
    }

    #[test]
    fn test_condition_chain_with_connectives() {
        let schema = schema();
        let mut ws = Workspace::new("show users where age > 30 and status is 'Active' or name contains bob order by age");
        let mut filter = Filter::default();
        extract_conditions(&mut ws, &ctx(&schema), &mut filter).unwrap();

        assert_eq!(filter.terms.len(), 1);
        assert_eq!(
            filter.terms[0].1.to_sql(SqlDialect::Postgres),
            "(age > 30 AND status = 'Active' OR name LIKE '%bob%')"
        );
        assert!(ws.text().contains("order by age"));
        assert!(!ws.text().contains("where"));
    }

    #[test]
    fn test_unknown_condition_column_fails_closed() {
        let schema = schema();
        let mut ws = Workspace::new("show users where salary > 10");
        let mut filter = Filter::default();
        let err = extract_conditions(&mut ws, &ctx(&schema), &mut filter).unwrap_err();
        assert!(matches!(err, QueryError::UnresolvedColumn { ref column, .. } if column == "salary"));
    }

    #[test]
    fn test_implicit_equality_needs_known_column() {
        let schema = schema();
        let mut ws = Workspace::new("find users with status active");
        let mut filter = Filter::default();
        extract_conditions(&mut ws, &ctx(&schema), &mut filter).unwrap();
        assert_eq!(filter.terms.len(), 1);

        let mut ws = Workspace::new("find users with lots of friends");
        let mut filter = Filter::default();
        extract_conditions(&mut ws, &ctx(&schema), &mut filter).unwrap();
        assert!(filter.is_empty());
    }

    #[test]
    fn test_group_by_skips_order_by() {
        let schema = schema();
        let mut ws = Workspace::new("count users ordered by age");
        assert_eq!(extract_group_by(&mut ws, &ctx(&schema), true).unwrap(), None);

        let mut ws = Workspace::new("count users by status");
        assert_eq!(extract_group_by(&mut ws, &ctx(&schema), true).unwrap(), Some("status".to_string()));

        let mut ws = Workspace::new("show users by status");
        assert_eq!(extract_group_by(&mut ws, &ctx(&schema), false).unwrap(), None);
    }

    #[test]
    fn test_assignments() {
        let schema = schema();
        let mut ws = Workspace::new("update users set status to 'Gold' and age = 41 where id = 3");
        let set = extract_set_clause(&mut ws, &ctx(&schema)).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set[0].column, "status");
        assert_eq!(set[1].value, Literal::Number("41".to_string()));
        assert!(ws.text().contains("where id = 3"));
    }

    #[test]
    fn test_time_window_extraction() {
        let mut ws = Workspace::new("show users created in the last 2 weeks");
        assert_eq!(
            extract_time_window(&mut ws).unwrap(),
            Some(TimeWindow::Last { amount: 14, unit: TimeUnit::Day })
        );
        assert_eq!(ws.text().trim_end(), "show users");

        let mut ws = Workspace::new("count orders from yesterday");
        assert_eq!(extract_time_window(&mut ws).unwrap(), Some(TimeWindow::Yesterday));
    }

    #[test]
    fn test_oversized_time_window_fails_closed() {
        let mut ws = Workspace::new("show users in the last 700000000 weeks");
        assert!(matches!(
            extract_time_window(&mut ws),
            Err(QueryError::UnrecognizedIntent { .. })
        ));

        let mut ws = Workspace::new("show users in the last 99999999999 days");
        assert!(extract_time_window(&mut ws).is_err());

        let mut ws = Workspace::new("show users in the last 613566757 weeks");
        assert!(extract_time_window(&mut ws).is_err());
    }
}
