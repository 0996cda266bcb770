//! Parsers for the free-form routine text the catalog hands back
//!
//! Argument lists come from `pg_get_function_arguments`, return types from
//! `pg_get_function_result` and trigger descriptions from the aggregate built in
//! [`GET_FUNCTIONS`](crate::pg_select_types::GET_FUNCTIONS). None of these fail:
//! fragments that cannot be understood are replaced with defaults.
use std::collections::BTreeSet;

use tracing::warn;

use crate::{
	sql_tree::*,
	type_map::is_known_type,
};

/// Splits on `sep` outside of parentheses and quotes
pub fn split_top_level(s: &str, sep: char) -> Vec<&str> {
	let mut parts = Vec::new();
	let mut depth = 0usize;
	let mut quote: Option<char> = None;
	let mut start = 0;
	for (i, c) in s.char_indices() {
		match (quote, c) {
			(Some(q), c) if c == q => quote = None,
			(Some(_), _) => (),
			(None, '\'') | (None, '"') => quote = Some(c),
			(None, '(') | (None, '[') => depth += 1,
			(None, ')') | (None, ']') => depth = depth.saturating_sub(1),
			(None, c) if c == sep && depth == 0 => {
				parts.push(&s[start..i]);
				start = i + c.len_utf8();
			},
			_ => (),
		}
	}
	parts.push(&s[start..]);
	parts.into_iter().map(str::trim).filter(|p| !p.is_empty()).collect()
}

/// Parses a full argument list like `IN p_id integer, p_note text DEFAULT 'n/a'::text`
pub fn parse_parameters(arguments: &str) -> Vec<FunctionParameter> {
	split_top_level(arguments, ',')
		.into_iter()
		.enumerate()
		.map(|(i, entry)| parse_parameter(entry, i))
		.collect()
}

/// Parses one argument entry; `index` names the parameter when the entry has no name
pub fn parse_parameter(entry: &str, index: usize) -> FunctionParameter {
	let (declaration, default_value) = split_default(entry.trim());

	let (mode, rest) = {
		let (first, after) = split_first_word(declaration);
		match ParameterMode::parse(first) {
			Some(mode) => (mode, after),
			None => (ParameterMode::In, declaration),
		}
	};

	let (name, sql_type) = if rest.is_empty() {
		(None, "text")
	} else if is_known_type(rest) || !rest.contains(char::is_whitespace) {
		// unnamed parameter, the whole remainder is its type
		(None, rest)
	} else {
		match split_name(rest) {
			(name, sql_type) if !sql_type.is_empty() => (Some(name), sql_type),
			// a single quoted type like `public."My Type"`
			_ => (None, rest),
		}
	};

	FunctionParameter {
		name: name.filter(|n| !n.is_empty()).unwrap_or_else(|| format!("input_{}", index)),
		sql_type: sql_type.to_owned(),
		mode,
		has_default: default_value.is_some(),
		default_value,
	}
}

/// Splits `decl DEFAULT expr` or `decl = expr`
fn split_default(entry: &str) -> (&str, Option<String>) {
	let upper = entry.to_ascii_uppercase();
	for keyword in [" DEFAULT ", " = "].iter() {
		if let Some(at) = upper.find(*keyword) {
			let default = entry[at + keyword.len()..].trim();
			return (entry[..at].trim(), Some(default.to_owned()));
		}
	}
	(entry, None)
}

fn split_first_word(s: &str) -> (&str, &str) {
	match s.split_once(char::is_whitespace) {
		Some((first, rest)) => (first, rest.trim()),
		None => (s, ""),
	}
}

/// Splits a leading (possibly quoted) identifier off a `name type` pair
///
/// Whitespace inside double quotes does not end the name.
fn split_name(s: &str) -> (String, &str) {
	let mut quoted = false;
	let mut end = s.len();
	for (i, c) in s.char_indices() {
		match c {
			'"' => quoted = !quoted,
			c if c.is_whitespace() && !quoted => {
				end = i;
				break;
			},
			_ => (),
		}
	}
	let (token, rest) = (&s[..end], s[end..].trim());
	let name = match token.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
		Some(inner) => inner.replace("\"\"", "\""),
		None => token.to_owned(),
	};
	(name, rest)
}

/// Whether the return type uses the `TABLE(...)` composite grammar
pub fn is_table_grammar(return_type: &str) -> bool {
	let trimmed = return_type.trim_start();
	match trimmed.get(..5) {
		Some(head) if head.eq_ignore_ascii_case("TABLE") => trimmed[5..].trim_start().starts_with('('),
		_ => false,
	}
}

/// Parses the columns of `TABLE(id integer, name text)`; any other return type yields no columns
pub fn parse_return_columns(return_type: &str) -> Vec<ReturnColumn> {
	if !is_table_grammar(return_type) {
		return Vec::new();
	}
	let (open, close) = match (return_type.find('('), return_type.rfind(')')) {
		(Some(open), Some(close)) if open < close => (open, close),
		_ => {
			warn!("unbalanced TABLE return type: {}", return_type);
			return Vec::new();
		},
	};
	split_top_level(&return_type[open + 1..close], ',')
		.into_iter()
		.filter_map(|column| {
			let (name, sql_type) = split_name(column);
			if name.is_empty() || sql_type.is_empty() {
				warn!("invalid column definition in TABLE type: {}", column);
				None
			} else {
				Some(ReturnColumn {
					name,
					sql_type: sql_type.to_owned(),
				})
			}
		})
		.collect()
}

/// The relation or type named by `SETOF x`
pub fn setof_target(return_type: &str) -> Option<&str> {
	let trimmed = return_type.trim();
	match trimmed.get(..6) {
		Some(head) if head.eq_ignore_ascii_case("SETOF ") => Some(trimmed[6..].trim()).filter(|t| !t.is_empty()),
		_ => None,
	}
}

/// Classifies a routine from its return type, `proretset` and `prokind`
pub fn classify_kind(return_type: &str, returns_set: bool, prokind: &str) -> FunctionKind {
	if is_table_grammar(return_type) {
		FunctionKind::Table
	} else if returns_set {
		FunctionKind::SetReturning
	} else {
		match prokind {
			"a" => FunctionKind::Aggregate,
			"w" => FunctionKind::Window,
			_ => FunctionKind::Scalar,
		}
	}
}

/// Parses `BEFORE INSERT OR UPDATE ON public.users; AFTER DELETE ON public.orders`
///
/// Entries that are not understood are skipped
pub fn parse_trigger_bindings(description: &str) -> Vec<TriggerBinding> {
	description
		.split(';')
		.map(str::trim)
		.filter(|entry| !entry.is_empty())
		.filter_map(|entry| {
			let binding = parse_trigger_binding(entry);
			if binding.is_none() {
				warn!("unrecognized trigger description: {}", entry);
			}
			binding
		})
		.collect()
}

fn parse_trigger_binding(entry: &str) -> Option<TriggerBinding> {
	let (spec, table) = entry.rsplit_once(" ON ")?;
	let upper = spec.trim().to_ascii_uppercase();
	let (timing, events) = if let Some(rest) = upper.strip_prefix("INSTEAD OF ") {
		(TriggerTiming::InsteadOf, rest)
	} else if let Some(rest) = upper.strip_prefix("BEFORE ") {
		(TriggerTiming::Before, rest)
	} else if let Some(rest) = upper.strip_prefix("AFTER ") {
		(TriggerTiming::After, rest)
	} else {
		return None;
	};
	let events: BTreeSet<_> = events.split(" OR ").filter_map(|e| TriggerEvent::parse(e.trim())).collect();
	if events.is_empty() {
		return None;
	}
	let (table_schema, table_name) = table.trim().split_once('.')?;
	Some(TriggerBinding {
		timing,
		events,
		table_schema: table_schema.to_owned(),
		table_name: table_name.to_owned(),
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn function_style_parameters() {
		let params = parse_parameters("p_user_id integer, p_email character varying");
		assert_eq!(params.len(), 2);
		assert_eq!(params[0].name, "p_user_id");
		assert_eq!(params[0].sql_type, "integer");
		assert_eq!(params[0].mode, ParameterMode::In);
		assert_eq!(params[1].sql_type, "character varying");
	}

	#[test]
	fn procedure_style_parameters_carry_modes() {
		let params = parse_parameters("IN p_id integer, INOUT p_total numeric, OUT p_status text, VARIADIC p_tags text[]");
		let modes: Vec<_> = params.iter().map(|p| p.mode).collect();
		assert_eq!(
			modes,
			vec![ParameterMode::In, ParameterMode::InOut, ParameterMode::Out, ParameterMode::Variadic]
		);
		assert_eq!(params[2].name, "p_status");
		assert_eq!(params[3].sql_type, "text[]");
	}

	#[test]
	fn defaults_are_kept_as_text() {
		let params = parse_parameters("p_limit integer DEFAULT 10, p_label text DEFAULT 'a, b'::text");
		assert_eq!(params.len(), 2);
		assert!(params[0].has_default);
		assert_eq!(params[0].default_value.as_deref(), Some("10"));
		assert_eq!(params[1].sql_type, "text");
		assert_eq!(params[1].default_value.as_deref(), Some("'a, b'::text"));
	}

	#[test]
	fn unnamed_parameters_are_synthesized() {
		let params = parse_parameters("integer, double precision, OUT text");
		let names: Vec<_> = params.iter().map(|p| p.name.as_str()).collect();
		assert_eq!(names, vec!["input_0", "input_1", "input_2"]);
		assert_eq!(params[1].sql_type, "double precision");
		assert_eq!(params[2].mode, ParameterMode::Out);
	}

	#[test]
	fn quoted_parameter_names() {
		let p = parse_parameter(r#""Order ""Id""" bigint"#, 0);
		assert_eq!(p.name, r#"Order "Id""#);
		assert_eq!(p.sql_type, "bigint");
	}

	#[test]
	fn quoted_types_with_spaces_stay_whole() {
		let p = parse_parameter(r#""My Type""#, 0);
		assert_eq!(p.name, "input_0");
		assert_eq!(p.sql_type, r#""My Type""#);

		let p = parse_parameter(r#"public."My Type""#, 1);
		assert_eq!(p.name, "input_1");
		assert_eq!(p.sql_type, r#"public."My Type""#);

		let p = parse_parameter(r#"p_kind public."My Type" DEFAULT NULL"#, 2);
		assert_eq!(p.name, "p_kind");
		assert_eq!(p.sql_type, r#"public."My Type""#);
		assert!(p.has_default);
	}

	#[test]
	fn empty_argument_list() {
		assert!(parse_parameters("").is_empty());
		assert!(parse_parameters("  ").is_empty());
	}

	#[test]
	fn table_return_columns() {
		let columns = parse_return_columns("TABLE(id integer, name text, created_at timestamp with time zone)");
		let pairs: Vec<_> = columns.iter().map(|c| (c.name.as_str(), c.sql_type.as_str())).collect();
		assert_eq!(
			pairs,
			vec![("id", "integer"), ("name", "text"), ("created_at", "timestamp with time zone")]
		);
	}

	#[test]
	fn table_columns_with_modifiers_keep_commas() {
		let columns = parse_return_columns("TABLE(total numeric(10,2), label text)");
		assert_eq!(columns.len(), 2);
		assert_eq!(columns[0].sql_type, "numeric(10,2)");
	}

	#[test]
	fn malformed_table_columns_are_skipped() {
		let columns = parse_return_columns("TABLE(id, name text)");
		assert_eq!(columns.len(), 1);
		assert_eq!(columns[0].name, "name");
		assert!(parse_return_columns("TABLE(id integer").is_empty());
	}

	#[test]
	fn non_table_returns_have_no_columns() {
		assert!(parse_return_columns("integer").is_empty());
		assert!(parse_return_columns("SETOF users").is_empty());
		assert!(parse_return_columns("tablespace_info").is_empty());
	}

	#[test]
	fn kinds() {
		assert_eq!(classify_kind("TABLE(id integer)", true, "f"), FunctionKind::Table);
		assert_eq!(classify_kind("SETOF users", true, "f"), FunctionKind::SetReturning);
		assert_eq!(classify_kind("bigint", false, "a"), FunctionKind::Aggregate);
		assert_eq!(classify_kind("bigint", false, "w"), FunctionKind::Window);
		assert_eq!(classify_kind("integer", false, "f"), FunctionKind::Scalar);
	}

	#[test]
	fn setof_targets() {
		assert_eq!(setof_target("SETOF public.users"), Some("public.users"));
		assert_eq!(setof_target("setof integer"), Some("integer"));
		assert_eq!(setof_target("integer"), None);
	}

	#[test]
	fn volatility_codes() {
		assert_eq!(Volatility::from_code("i"), Volatility::Immutable);
		assert_eq!(Volatility::from_code("s"), Volatility::Stable);
		assert_eq!(Volatility::from_code("v"), Volatility::Volatile);
		assert_eq!(Volatility::from_code("x"), Volatility::Volatile);
	}

	#[test]
	fn trigger_descriptions() {
		let bindings = parse_trigger_bindings("BEFORE INSERT OR UPDATE ON public.users; INSTEAD OF DELETE ON app.v_orders");
		assert_eq!(bindings.len(), 2);
		assert_eq!(bindings[0].timing, TriggerTiming::Before);
		assert!(bindings[0].events.contains(&TriggerEvent::Insert));
		assert!(bindings[0].events.contains(&TriggerEvent::Update));
		assert_eq!(bindings[0].table_name, "users");
		assert_eq!(bindings[1].timing, TriggerTiming::InsteadOf);
		assert_eq!(bindings[1].table_schema, "app");
	}

	#[test]
	fn garbage_trigger_descriptions_are_skipped() {
		assert!(parse_trigger_bindings("WHENEVER ON x.y; AFTER ON a.b").is_empty());
	}
}
