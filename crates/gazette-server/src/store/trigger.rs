//! Notification trigger SQL.
//!
//! The trigger fires after every committed insert or update on the watched
//! table and publishes the row as JSON on `<table>_changes`.

use gazette_relay::channel_name;

use super::StoreError;

/// Trigger definition for one table.
#[derive(Debug, Clone)]
pub struct TriggerSpec {
    table: String,
    columns: Vec<String>,
}

impl TriggerSpec {
    /// Build a trigger for `table` that copies `columns` into the payload.
    ///
    /// Fails if any identifier is not `[A-Za-z_][A-Za-z0-9_]*`.
    pub fn new<I, S>(table: impl Into<String>, columns: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let table = table.into();
        validate_identifier(&table)?;

        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        for column in &columns {
            validate_identifier(column)?;
        }

        Ok(Self { table, columns })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Channel the trigger notifies.
    pub fn channel(&self) -> String {
        channel_name(&self.table)
    }

    pub fn function_name(&self) -> String {
        format!("notify_{}_change", self.table)
    }

    pub fn trigger_name(&self) -> String {
        format!("{}_notify_trigger", self.table)
    }

    /// `CREATE OR REPLACE FUNCTION` statement for the trigger function.
    pub fn function_sql(&self) -> String {
        let mut fields = vec!["'operation', TG_OP".to_string()];
        fields.extend(
            self.columns
                .iter()
                .map(|column| format!("'{column}', NEW.{column}")),
        );

        format!(
            "CREATE OR REPLACE FUNCTION {function}() RETURNS trigger AS $$\n\
             BEGIN\n    \
             PERFORM pg_notify(\n        \
             '{channel}',\n        \
             json_build_object({fields})::text\n    \
             );\n    \
             RETURN NEW;\n\
             END;\n\
             $$ LANGUAGE plpgsql",
            function = self.function_name(),
            channel = self.channel(),
            fields = fields.join(", "),
        )
    }

    /// Statements that (re)install the trigger, in execution order.
    pub fn install_statements(&self) -> Vec<String> {
        vec![
            self.function_sql(),
            format!(
                "DROP TRIGGER IF EXISTS {trigger} ON {table}",
                trigger = self.trigger_name(),
                table = self.table,
            ),
            format!(
                "CREATE TRIGGER {trigger} AFTER INSERT OR UPDATE ON {table} \
                 FOR EACH ROW EXECUTE FUNCTION {function}()",
                trigger = self.trigger_name(),
                table = self.table,
                function = self.function_name(),
            ),
        ]
    }
}

fn validate_identifier(name: &str) -> Result<(), StoreError> {
    let mut chars = name.chars();
    let valid_start = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}
