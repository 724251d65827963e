use serde::Serialize;

pub const ASK_COMMAND: &str = "ask";
pub const ASK_QUESTION_OPTION: &str = "question";
pub const CLEAR_DM_COMMAND: &str = "cleardm";

const CHAT_INPUT_COMMAND_TYPE: u8 = 1;
const STRING_OPTION_TYPE: u8 = 3;

/// Slash-command registration payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<CommandOption>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOption {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: u8,
    pub required: bool,
}

pub fn default_commands() -> Vec<CommandDefinition> {
    vec![
        CommandDefinition {
            name: ASK_COMMAND.to_string(),
            description: "Ask the AI a question".to_string(),
            kind: CHAT_INPUT_COMMAND_TYPE,
            options: vec![CommandOption {
                name: ASK_QUESTION_OPTION.to_string(),
                description: "What would you like to ask?".to_string(),
                kind: STRING_OPTION_TYPE,
                required: true,
            }],
        },
        CommandDefinition {
            name: CLEAR_DM_COMMAND.to_string(),
            description: "Delete the bot's messages in this DM".to_string(),
            kind: CHAT_INPUT_COMMAND_TYPE,
            options: Vec::new(),
        },
    ]
}
