use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value, json};
use sqlagent_db::SqlDatabase;
use sqlagent_llm::ToolDefinition;

/// The database operations offered to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlTool {
    ListTables,
    Schema,
    QueryChecker,
    Query,
}

impl SqlTool {
    pub const ALL: [SqlTool; 4] = [
        SqlTool::ListTables,
        SqlTool::Schema,
        SqlTool::QueryChecker,
        SqlTool::Query,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SqlTool::ListTables => "sql_db_list_tables",
            SqlTool::Schema => "sql_db_schema",
            SqlTool::QueryChecker => "sql_db_query_checker",
            SqlTool::Query => "sql_db_query",
        }
    }

    pub fn definition(&self) -> ToolDefinition {
        let (description, parameters) = match self {
            SqlTool::ListTables => (
                "List all available tables in the database",
                json!({
                    "type": "object",
                    "properties": {
                        "empty_input": {"type": "string", "description": "Empty string input (not used)"}
                    },
                    "required": []
                }),
            ),
            SqlTool::Schema => (
                "Get table structure and sample data for specified tables",
                json!({
                    "type": "object",
                    "properties": {
                        "tables": {"type": "string", "description": "Comma-separated list of table names"}
                    },
                    "required": ["tables"]
                }),
            ),
            SqlTool::QueryChecker => (
                "Validate SQL queries before execution",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "SQL query to validate"}
                    },
                    "required": ["query"]
                }),
            ),
            SqlTool::Query => (
                "Execute SQL queries against the database",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "Valid SQL query to execute"}
                    },
                    "required": ["query"]
                }),
            ),
        };

        ToolDefinition {
            name: self.name().to_string(),
            description: description.to_string(),
            parameters,
        }
    }

    async fn invoke(&self, db: &SqlDatabase, args: &Map<String, Value>) -> String {
        match self {
            SqlTool::ListTables => db.list_tables().await,
            SqlTool::Schema => db.schema(string_arg(args, "tables")).await,
            SqlTool::QueryChecker => db.check_query(string_arg(args, "query")),
            SqlTool::Query => db.run_query(string_arg(args, "query")).await,
        }
    }
}

/// Missing or non-string arguments read as empty.
fn string_arg<'a>(args: &'a Map<String, Value>, key: &str) -> &'a str {
    args.get(key).and_then(Value::as_str).unwrap_or("")
}

impl fmt::Display for SqlTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SqlTool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SqlTool::ALL
            .into_iter()
            .find(|tool| tool.name() == s)
            .ok_or_else(|| format!("Unknown function: {s}"))
    }
}

/// Tool catalog in the order it is presented to the model.
pub fn sql_tools() -> Vec<ToolDefinition> {
    SqlTool::ALL.iter().map(SqlTool::definition).collect()
}

/// Run one tool call and return the text handed back to the model.
pub async fn dispatch(db: &SqlDatabase, name: &str, arguments: &str) -> String {
    let tool = match name.parse::<SqlTool>() {
        Ok(tool) => tool,
        Err(message) => return message,
    };

    match parse_arguments(arguments) {
        Ok(args) => tool.invoke(db, &args).await,
        Err(reason) => format!("Error: invalid arguments for {name}: {reason}"),
    }
}

fn parse_arguments(arguments: &str) -> Result<Map<String, Value>, String> {
    if arguments.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(arguments) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("expected a JSON object".to_string()),
        Err(err) => Err(err.to_string()),
    }
}
