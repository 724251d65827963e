//! Decoder for the agent's line-oriented data stream.
//!
//! Each line is `<code>:<json>`. Recognised codes: `0` text delta, `9` tool
//! call, `a` tool result, `3` error, `d` finish. Other codes are skipped.

use crate::error::{AgentError, Result};
use crate::types::AgentEvent;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;

pub(crate) fn decode_data_stream<S>(bytes_stream: S) -> impl Stream<Item = Result<AgentEvent>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + 'static,
{
    let lines = Box::pin(decode_lines(bytes_stream));
    futures_util::stream::unfold(
        (lines, DataStreamState::default()),
        |(mut lines, mut state)| async move {
            loop {
                let line = match lines.as_mut().next().await? {
                    Ok(line) => line,
                    Err(e) => return Some((Err(e), (lines, state))),
                };
                match state.parse_line(&line) {
                    Ok(Some(event)) => return Some((Ok(event), (lines, state))),
                    Ok(None) => continue,
                    Err(e) => return Some((Err(e), (lines, state))),
                }
            }
        },
    )
}

/// Splits a byte stream on `\n`, decoding each complete line as UTF-8.
fn decode_lines<S>(bytes_stream: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + 'static,
{
    futures_util::stream::unfold(
        (Box::pin(bytes_stream), Vec::<u8>::new(), false),
        |(mut stream, mut buffer, mut finished)| async move {
            loop {
                if let Some(idx) = buffer.iter().position(|b| *b == b'\n') {
                    let raw: Vec<u8> = buffer.drain(..=idx).collect();
                    let line = String::from_utf8_lossy(&raw[..idx])
                        .trim_end_matches('\r')
                        .to_string();
                    return Some((Ok(line), (stream, buffer, finished)));
                }
                if finished {
                    if buffer.is_empty() {
                        return None;
                    }
                    let line = String::from_utf8_lossy(&buffer).to_string();
                    buffer.clear();
                    return Some((Ok(line), (stream, buffer, finished)));
                }

                match stream.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        finished = true;
                        buffer.clear();
                        return Some((Err(AgentError::from(e)), (stream, buffer, finished)));
                    }
                    None => finished = true,
                }
            }
        },
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolCallPart {
    tool_call_id: String,
    tool_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolResultPart {
    tool_call_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinishPart {
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default)]
struct DataStreamState {
    tool_names: HashMap<String, String>,
}

impl DataStreamState {
    fn parse_line(&mut self, line: &str) -> Result<Option<AgentEvent>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let Some((code, payload)) = line.split_once(':') else {
            return Err(AgentError::StreamParse(format!(
                "line missing type prefix: {line}"
            )));
        };

        let event = match code {
            "0" => AgentEvent::TextDelta {
                text: parse_payload(code, payload)?,
            },
            "9" => {
                let call: ToolCallPart = parse_payload(code, payload)?;
                self.tool_names
                    .insert(call.tool_call_id.clone(), call.tool_name.clone());
                AgentEvent::ToolCall {
                    id: call.tool_call_id,
                    name: call.tool_name,
                }
            }
            "a" => {
                let result: ToolResultPart = parse_payload(code, payload)?;
                let name = self.tool_names.get(&result.tool_call_id).cloned();
                AgentEvent::ToolResult {
                    id: result.tool_call_id,
                    name,
                }
            }
            "3" => AgentEvent::Error {
                message: parse_payload(code, payload)?,
            },
            "d" => {
                let finish: FinishPart = parse_payload(code, payload)?;
                AgentEvent::Finish {
                    reason: finish.finish_reason,
                }
            }
            other => {
                tracing::trace!(code = other, "skipping unhandled stream part");
                return Ok(None);
            }
        };
        Ok(Some(event))
    }
}

fn parse_payload<T: DeserializeOwned>(code: &str, payload: &str) -> Result<T> {
    serde_json::from_str(payload)
        .map_err(|e| AgentError::StreamParse(format!("part {code} json error={e} data={payload}")))
}
