use std::marker::PhantomData;

use crate::error::CommandError;

/// Represents an empty command. Used as a marker in [`CommandBuilder`].
pub struct NoCmd;
/// Represents a command that has its path set. Used as a marker in [`CommandBuilder`].
#[derive(Clone)]
pub struct Cmd;

/// Builds the words of a RouterOS command using a fluent API.
///
/// Only builders with a command path can be built, so every [`Command`] starts with its
/// path word. The tag is not part of the command: it is chosen when the command is sent.
///
/// # Examples
/// ```
/// use routeros_proto::command::CommandBuilder;
/// let cmd = CommandBuilder::new()
///     .command("/interface/monitor-traffic").unwrap()
///     .attribute("interface", Some("ether1"))
///     .attribute("once", None)
///     .build();
/// assert_eq!(cmd.words(), ["/interface/monitor-traffic", "=interface=ether1", "=once="]);
/// ```
#[derive(Clone)]
pub struct CommandBuilder<State> {
    words: Vec<String>,
    state: PhantomData<State>,
}

impl Default for CommandBuilder<NoCmd> {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandBuilder<NoCmd> {
    /// Begin building a new [`Command`].
    pub fn new() -> Self {
        Self {
            words: Vec::new(),
            state: PhantomData,
        }
    }

    /// Builds the first step of a challenge login: a bare `/login`.
    pub fn login_challenge() -> Command {
        Command {
            words: vec!["/login".to_string()],
        }
    }

    /// Builds the second step of a challenge login, answering the device's challenge.
    pub fn login_response(username: &str, response: &str) -> Command {
        Command {
            words: vec![
                "/login".to_string(),
                format!("=name={username}"),
                format!("=response={response}"),
            ],
        }
    }

    /// Builds a plain login, accepted by RouterOS 6.43 and later.
    pub fn login_plain(username: &str, password: &str) -> Command {
        Command {
            words: vec![
                "/login".to_string(),
                format!("=name={username}"),
                format!("=password={password}"),
            ],
        }
    }

    /// Builds a command to cancel the running command identified by `tag`.
    pub fn cancel(tag: &str) -> Command {
        Command {
            words: vec!["/cancel".to_string(), format!("=tag={tag}")],
        }
    }

    /// Specify the command path to be executed, such as `/interface/print`.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Path`] if `path` does not start with `/`.
    pub fn command(self, path: &str) -> Result<CommandBuilder<Cmd>, CommandError> {
        if !path.starts_with('/') {
            return Err(CommandError::Path(path.to_string()));
        }
        let Self { mut words, .. } = self;
        words.push(path.to_string());
        Ok(CommandBuilder {
            words,
            state: PhantomData,
        })
    }
}

impl CommandBuilder<Cmd> {
    /// Adds an attribute to the command being built.
    ///
    /// If `value` is `None` the attribute is sent as a flag (`=key=`).
    pub fn attribute(mut self, key: &str, value: Option<&str>) -> Self {
        self.words
            .push(format!("={key}={}", value.unwrap_or_default()));
        self
    }

    /// Selects items that have property `name`.
    pub fn query_is_present(mut self, name: &str) -> Self {
        self.words.push(format!("?{name}"));
        self
    }

    /// Selects items that do not have property `name`.
    pub fn query_not_present(mut self, name: &str) -> Self {
        self.words.push(format!("?-{name}"));
        self
    }

    /// Selects items whose property `name` equals `value`.
    pub fn query_equal(mut self, name: &str, value: &str) -> Self {
        self.words.push(format!("?{name}={value}"));
        self
    }

    /// Selects items whose property `name` is greater than `value`.
    pub fn query_gt(mut self, name: &str, value: &str) -> Self {
        self.words.push(format!("?>{name}={value}"));
        self
    }

    /// Selects items whose property `name` is less than `value`.
    pub fn query_lt(mut self, name: &str, value: &str) -> Self {
        self.words.push(format!("?<{name}={value}"));
        self
    }

    /// Combines the results of previous queries on the stack.
    /// <https://help.mikrotik.com/docs/spaces/ROS/pages/47579160/API#API-Queries>
    pub fn query_operations(mut self, operations: impl IntoIterator<Item = QueryOperator>) -> Self {
        let query: String = "?#"
            .chars()
            .chain(operations.into_iter().map(QueryOperator::code))
            .collect();
        self.words.push(query);
        self
    }

    /// Finalizes the command.
    pub fn build(self) -> Command {
        Command { words: self.words }
    }
}

/// A command ready to be sent with a tag. To create one, use a [`CommandBuilder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    words: Vec<String>,
}

impl Command {
    /// Words of the command, path first.
    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// Consumes the command, returning its words.
    pub fn into_words(self) -> Vec<String> {
        self.words
    }
}

/// Query stack operators.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum QueryOperator {
    /// Represents the `!` operator.
    Not,
    /// Represents the `&` operator.
    And,
    /// Represents the `|` operator.
    Or,
    /// Represents the `.` operator.
    Dot,
}

impl QueryOperator {
    #[inline]
    fn code(self) -> char {
        match self {
            QueryOperator::Not => '!',
            QueryOperator::And => '&',
            QueryOperator::Or => '|',
            QueryOperator::Dot => '.',
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder_command() {
        let cmd = CommandBuilder::new()
            .command("/interface/print")
            .unwrap()
            .build();
        assert_eq!(cmd.words(), ["/interface/print"]);
    }

    #[test]
    fn test_command_builder_rejects_relative_path() {
        assert_eq!(
            CommandBuilder::new().command("interface/print").err(),
            Some(CommandError::Path("interface/print".to_string()))
        );
    }

    #[test]
    fn test_command_builder_attribute() {
        let cmd = CommandBuilder::new()
            .command("/interface/print")
            .unwrap()
            .attribute("name", Some("ether1"))
            .attribute("disabled", None)
            .build();

        assert_eq!(
            cmd.words(),
            ["/interface/print", "=name=ether1", "=disabled="]
        );
    }

    #[test]
    fn test_command_builder_queries() {
        let cmd = CommandBuilder::new()
            .command("/interface/print")
            .unwrap()
            .query_equal("type", "ether")
            .query_is_present("comment")
            .query_not_present("slave")
            .query_gt("mtu", "1500")
            .query_lt("mtu", "9000")
            .query_operations([QueryOperator::And, QueryOperator::Not])
            .build();

        assert_eq!(
            cmd.words()[1..],
            [
                "?type=ether",
                "?comment",
                "?-slave",
                "?>mtu=1500",
                "?<mtu=9000",
                "?#&!"
            ]
        );
    }

    #[test]
    fn test_login_commands() {
        assert_eq!(CommandBuilder::login_challenge().words(), ["/login"]);
        assert_eq!(
            CommandBuilder::login_response("admin", "00ab").words(),
            ["/login", "=name=admin", "=response=00ab"]
        );
        assert_eq!(
            CommandBuilder::login_plain("admin", "password").words(),
            ["/login", "=name=admin", "=password=password"]
        );
    }

    #[test]
    fn test_command_builder_cancel() {
        assert_eq!(
            CommandBuilder::cancel("traffic").words(),
            ["/cancel", "=tag=traffic"]
        );
    }
}
