//! Translates the canonical `$1, $2, …` placeholder convention into a
//! backend's native placeholder syntax, in the order placeholders actually
//! appear in the statement (not the order they were declared).

use serde_json::Value;

/// Rewrites every `$N` occurrence in `sql` (left to right) into `native`,
/// and returns the matching parameter list in call order — the shape a
/// driver that binds positionally (e.g. MySQL's `?`) needs.
pub fn translate_positional(sql: &str, params: &[Value], native: &str) -> (String, Vec<Value>) {
    let mut rewritten = String::with_capacity(sql.len());
    let mut ordered = Vec::with_capacity(params.len());
    // Operate on chars, not bytes — `$N` markers are always ASCII, but the
    // surrounding SQL text (string literals, identifiers) may not be.
    let chars: Vec<char> = sql.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '$' && i + 1 < chars.len() && chars[i + 1].is_ascii_digit() {
            let start = i + 1;
            let mut end = start;
            while end < chars.len() && chars[end].is_ascii_digit() {
                end += 1;
            }
            let digits: String = chars[start..end].iter().collect();
            let index: usize = digits.parse().unwrap_or(0);
            if index >= 1 && index <= params.len() {
                rewritten.push_str(native);
                ordered.push(params[index - 1].clone());
                i = end;
                continue;
            }
        }
        rewritten.push(chars[i]);
        i += 1;
    }

    (rewritten, ordered)
}

/// Wraps `sql` as a subquery with a backend-appropriate bounding clause.
/// `limit` must already be the resolved effective limit.
pub fn bound_as_subquery(sql: &str, limit: i64) -> String {
    format!("SELECT * FROM ({sql}) AS _bounded_query_ LIMIT {limit}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn postgres_placeholders_pass_through_unchanged() {
        let params = vec![json!(1), json!("x")];
        let (sql, ordered) = translate_positional("SELECT * FROM t WHERE a=$1 AND b=$2", &params, "$$");
        // Using "$$" as a stand-in native marker just to prove substitution happened.
        assert_eq!(sql, "SELECT * FROM t WHERE a=$$ AND b=$$");
        assert_eq!(ordered, params);
    }

    #[test]
    fn repeated_placeholder_binds_param_each_occurrence() {
        let params = vec![json!("alice")];
        let (sql, ordered) = translate_positional("WHERE a=$1 OR b=$1", &params, "?");
        assert_eq!(sql, "WHERE a=? OR b=?");
        assert_eq!(ordered, vec![json!("alice"), json!("alice")]);
    }

    #[test]
    fn out_of_order_placeholders_reorder_params() {
        let params = vec![json!("first"), json!("second")];
        let (sql, ordered) = translate_positional("WHERE a=$2 AND b=$1", &params, "?");
        assert_eq!(sql, "WHERE a=? AND b=?");
        assert_eq!(ordered, vec![json!("second"), json!("first")]);
    }

    #[test]
    fn multibyte_sql_text_survives_untouched() {
        let params = vec![json!("x")];
        let (sql, ordered) = translate_positional("WHERE name=$1 AND city='Zürich 京都'", &params, "?");
        assert_eq!(sql, "WHERE name=? AND city='Zürich 京都'");
        assert_eq!(ordered, params);
    }

    #[test]
    fn bound_as_subquery_wraps_with_limit() {
        assert_eq!(
            bound_as_subquery("SELECT * FROM t", 50),
            "SELECT * FROM (SELECT * FROM t) AS _bounded_query_ LIMIT 50"
        );
    }
}
