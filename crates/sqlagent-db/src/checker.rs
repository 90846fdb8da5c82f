//! SQL syntax checking and statement classification.
//!
//! Parsing uses `sqlparser` with the dialect of the connected engine. The
//! parser is stricter than most engines are forgiving, so classification
//! falls back to the token stream when a statement does not parse.

use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::{Dialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::keywords::Keyword;
use sqlparser::parser::{Parser, ParserError};
use sqlparser::tokenizer::{Token, Tokenizer};

use sqlagent_core::Engine;

use crate::options::AccessMode;

pub const VALID_SYNTAX: &str = "✓ Query syntax is valid.";

/// What running a statement does: whether it yields rows and whether it
/// changes anything. `INSERT ... RETURNING` does both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatementKind {
    pub returns_rows: bool,
    pub writes: bool,
}

impl StatementKind {
    pub const READ: Self = Self {
        returns_rows: true,
        writes: false,
    };

    pub const WRITE: Self = Self {
        returns_rows: false,
        writes: true,
    };

    fn write_returning(returning: bool) -> Self {
        Self {
            returns_rows: returning,
            writes: true,
        }
    }

    /// Both halves of a set operation or a multi-statement batch.
    fn combine(self, other: Self) -> Self {
        Self {
            returns_rows: self.returns_rows && other.returns_rows,
            writes: self.writes || other.writes,
        }
    }
}

const READ_KEYWORDS: &[Keyword] = &[
    Keyword::SELECT,
    Keyword::WITH,
    Keyword::VALUES,
    Keyword::EXPLAIN,
    Keyword::PRAGMA,
    Keyword::SHOW,
];

/// Reserved words that only appear in statements which change data or schema.
const WRITE_KEYWORDS: &[Keyword] = &[
    Keyword::INSERT,
    Keyword::UPDATE,
    Keyword::DELETE,
    Keyword::MERGE,
    Keyword::CREATE,
    Keyword::DROP,
    Keyword::ALTER,
    Keyword::TRUNCATE,
    Keyword::GRANT,
    Keyword::REVOKE,
];

fn dialect(engine: Engine) -> Box<dyn Dialect> {
    match engine {
        Engine::Sqlite => Box::new(SQLiteDialect {}),
        Engine::Postgres => Box::new(PostgreSqlDialect {}),
    }
}

pub fn parse(engine: Engine, sql: &str) -> Result<Vec<Statement>, ParserError> {
    Parser::parse_sql(dialect(engine).as_ref(), sql)
}

/// Classify `sql`. Multi-statement input returns rows only if every
/// statement does, and writes if any statement does.
pub fn classify(engine: Engine, sql: &str) -> StatementKind {
    match parse(engine, sql) {
        Ok(statements) if !statements.is_empty() => classify_all(&statements),
        _ => classify_by_tokens(engine, sql),
    }
}

fn classify_all(statements: &[Statement]) -> StatementKind {
    statements
        .iter()
        .map(statement_kind)
        .reduce(StatementKind::combine)
        .unwrap_or(StatementKind::WRITE)
}

fn statement_kind(statement: &Statement) -> StatementKind {
    match statement {
        Statement::Query(query) => query_kind(query),
        Statement::Insert(insert) => StatementKind::write_returning(insert.returning.is_some()),
        Statement::Update { returning, .. } => StatementKind::write_returning(returning.is_some()),
        Statement::Delete(delete) => StatementKind::write_returning(delete.returning.is_some()),
        // EXPLAIN ANALYZE runs the statement it explains.
        Statement::Explain {
            analyze, statement, ..
        } => StatementKind {
            returns_rows: true,
            writes: *analyze && statement_kind(statement).writes,
        },
        Statement::ExplainTable { .. }
        | Statement::ShowTables { .. }
        | Statement::ShowColumns { .. }
        | Statement::ShowVariable { .. }
        | Statement::ShowCreate { .. } => StatementKind::READ,
        Statement::Pragma { is_eq, .. } if *is_eq => StatementKind::WRITE,
        Statement::Pragma { .. } => StatementKind::READ,
        _ => StatementKind::WRITE,
    }
}

/// A query writes when its body or any of its common table expressions does.
fn query_kind(query: &Query) -> StatementKind {
    let body = set_expr_kind(&query.body);
    let cte_writes = query
        .with
        .iter()
        .flat_map(|with| &with.cte_tables)
        .any(|cte| query_kind(&cte.query).writes);
    StatementKind {
        returns_rows: body.returns_rows,
        writes: body.writes || cte_writes,
    }
}

fn set_expr_kind(expr: &SetExpr) -> StatementKind {
    match expr {
        SetExpr::Select(_) | SetExpr::Values(_) | SetExpr::Table(_) => StatementKind::READ,
        SetExpr::Query(query) => query_kind(query),
        SetExpr::SetOperation { left, right, .. } => {
            set_expr_kind(left).combine(set_expr_kind(right))
        }
        SetExpr::Insert(statement) | SetExpr::Update(statement) => statement_kind(statement),
    }
}

/// Classification for input the parser rejects. Any unquoted write keyword
/// anywhere in the text marks it as a write, so a data-modifying `WITH`
/// clause or a statement following one is not mistaken for a plain read.
fn classify_by_tokens(engine: Engine, sql: &str) -> StatementKind {
    let dialect = dialect(engine);
    let Ok(tokens) = Tokenizer::new(dialect.as_ref(), sql).tokenize() else {
        return StatementKind::WRITE;
    };

    let keywords: Vec<Keyword> = tokens
        .iter()
        .filter_map(|token| match token {
            Token::Word(word) if word.quote_style.is_none() => Some(word.keyword),
            _ => None,
        })
        .collect();
    let leading = keywords.first().copied().unwrap_or(Keyword::NoKeyword);

    let assigns_pragma = leading == Keyword::PRAGMA && tokens.contains(&Token::Eq);
    let writes = !READ_KEYWORDS.contains(&leading)
        || assigns_pragma
        || keywords.iter().any(|keyword| WRITE_KEYWORDS.contains(keyword));

    if writes {
        StatementKind::write_returning(keywords.contains(&Keyword::RETURNING))
    } else {
        StatementKind::READ
    }
}

/// Validate syntax and report the outcome as text for the model.
pub fn check_syntax(engine: Engine, query: &str, access: AccessMode) -> String {
    let query = query.trim();
    if query.is_empty() {
        return "Error: Empty query provided.".to_string();
    }

    let statements = match parse(engine, query) {
        Ok(statements) => statements,
        Err(err) => return format!("Error: Invalid SQL syntax: {}", parser_message(&err)),
    };

    if statements.is_empty() {
        return "Error: Unable to parse the SQL query.".to_string();
    }

    if access.is_read_only() && classify_all(&statements).writes {
        return "Error: Query modifies data but the database is read-only.".to_string();
    }

    VALID_SYNTAX.to_string()
}

fn parser_message(err: &ParserError) -> String {
    match err {
        ParserError::TokenizerError(message) | ParserError::ParserError(message) => {
            message.clone()
        }
        ParserError::RecursionLimitExceeded => "recursion limit exceeded".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const READ: StatementKind = StatementKind::READ;
    const WRITE: StatementKind = StatementKind::WRITE;
    const WRITE_RETURNING: StatementKind = StatementKind {
        returns_rows: true,
        writes: true,
    };

    #[test]
    fn classifies_queries_and_writes() {
        let cases = [
            ("SELECT * FROM Artist", READ),
            ("with t as (select 1) select * from t", READ),
            ("PRAGMA table_info(Artist)", READ),
            ("PRAGMA query_only = OFF", WRITE),
            ("EXPLAIN SELECT 1", READ),
            ("EXPLAIN DELETE FROM Genre", READ),
            ("SELECT 1 UNION SELECT 2", READ),
            ("INSERT INTO Genre (Name) VALUES ('Polka')", WRITE),
            ("UPDATE Track SET Milliseconds = 0", WRITE),
            ("DELETE FROM Genre", WRITE),
            ("CREATE TABLE t (id INTEGER)", WRITE),
            ("SELECT 1; DELETE FROM Genre", WRITE),
        ];
        for (sql, expected) in cases {
            assert_eq!(classify(Engine::Sqlite, sql), expected, "{sql}");
        }
    }

    #[test]
    fn returning_clauses_yield_rows_and_still_write() {
        let cases = [
            "INSERT INTO Genre (Name) VALUES ('Polka') RETURNING GenreId",
            "UPDATE Genre SET Name = 'Jazz' WHERE GenreId = 2 RETURNING *",
            "DELETE FROM Genre WHERE GenreId = 25 RETURNING Name",
        ];
        for sql in cases {
            assert_eq!(classify(Engine::Postgres, sql), WRITE_RETURNING, "{sql}");
            assert_eq!(classify(Engine::Sqlite, sql), WRITE_RETURNING, "{sql}");
        }
    }

    #[test]
    fn data_modifying_ctes_are_writes() {
        assert_eq!(
            classify(
                Engine::Postgres,
                "WITH moved AS (INSERT INTO archive SELECT * FROM orders RETURNING id) \
                 SELECT count(*) FROM moved"
            ),
            WRITE_RETURNING
        );
        assert_eq!(
            classify(
                Engine::Postgres,
                "WITH gone AS (DELETE FROM orders WHERE placed < now() RETURNING id) \
                 SELECT count(*) FROM gone"
            ),
            WRITE_RETURNING
        );
        assert_eq!(
            classify(
                Engine::Sqlite,
                "WITH old AS (SELECT GenreId FROM Genre WHERE GenreId > 20) \
                 DELETE FROM Genre WHERE GenreId IN (SELECT GenreId FROM old)"
            ),
            WRITE
        );
    }

    #[test]
    fn falls_back_to_tokens_when_unparseable() {
        assert_eq!(
            classify(Engine::Sqlite, "/* note */ -- hint\n  SELECT weird ~~~ syntax"),
            READ
        );
        assert_eq!(
            classify(Engine::Sqlite, "SELECT \"delete\" FROM log WHERE ~~~"),
            READ
        );
        assert_eq!(classify(Engine::Postgres, "VACUUM ANALYZE something odd"), WRITE);
    }

    #[test]
    fn reports_syntax_outcomes() {
        assert_eq!(
            check_syntax(Engine::Sqlite, "   ", AccessMode::ReadWrite),
            "Error: Empty query provided."
        );
        assert_eq!(
            check_syntax(Engine::Sqlite, "SELECT Name FROM Artist LIMIT 5", AccessMode::ReadWrite),
            VALID_SYNTAX
        );
        assert!(
            check_syntax(Engine::Postgres, "SELEC Name FROM Artist", AccessMode::ReadWrite)
                .starts_with("Error: Invalid SQL syntax:")
        );
    }

    #[test]
    fn read_only_rejects_writes_at_check_time() {
        assert_eq!(
            check_syntax(Engine::Sqlite, "DELETE FROM Artist", AccessMode::ReadOnly),
            "Error: Query modifies data but the database is read-only."
        );
        assert_eq!(
            check_syntax(Engine::Sqlite, "SELECT 1", AccessMode::ReadOnly),
            VALID_SYNTAX
        );
        assert_eq!(
            check_syntax(
                Engine::Postgres,
                "WITH moved AS (UPDATE orders SET status = 'gone' RETURNING id) SELECT id FROM moved",
                AccessMode::ReadOnly
            ),
            "Error: Query modifies data but the database is read-only."
        );
        assert_eq!(
            check_syntax(
                Engine::Sqlite,
                "INSERT INTO Genre (Name) VALUES ('Polka') RETURNING GenreId",
                AccessMode::ReadOnly
            ),
            "Error: Query modifies data but the database is read-only."
        );
    }
}
