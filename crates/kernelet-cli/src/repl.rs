//! Interactive REPL loop against a running kernel.
//!
//! One cell at a time: send `execute_request` on shell, then render iopub
//! traffic for that request until the kernel reports `idle` again.

use std::io::Write as _;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use kernelet::client::KernelClient;
use kernelet::wire::protocol::{
    DisplayData, ErrorReply, ExecuteInput, ExecuteResult, ExecutionState, MsgType, Status, Stream,
    StreamName,
};

pub struct Repl {
    client: KernelClient,
    execution_count: i64,
}

impl Repl {
    pub fn new(client: KernelClient) -> Self {
        Self {
            client,
            execution_count: 1,
        }
    }

    /// Prompt/execute/render until EOF.
    pub async fn run(mut self) -> Result<()> {
        let mut lines: Lines<BufReader<Stdin>> = BufReader::new(tokio::io::stdin()).lines();

        loop {
            print!("In [{}]: ", self.execution_count);
            std::io::stdout().flush()?;

            let Some(line) = lines.next_line().await? else {
                println!();
                break;
            };

            let code = line.trim();
            if code.is_empty() {
                continue;
            }

            self.run_cell(code).await?;
        }

        Ok(())
    }

    async fn run_cell(&mut self, code: &str) -> Result<()> {
        let msg_id = self.client.execute(code).await?;

        loop {
            let msg = self.client.recv_iopub().await?;
            if !msg.is_reply_to(&msg_id) {
                tracing::debug!(
                    msg_type = msg.msg_type().as_str(),
                    "Ignoring iopub message for another request"
                );
                continue;
            }

            match msg.msg_type() {
                MsgType::Status => {
                    let status: Status = msg.content_as()?;
                    if status.execution_state == ExecutionState::Idle {
                        break;
                    }
                }
                MsgType::ExecuteInput => {
                    let input: ExecuteInput = msg.content_as()?;
                    self.execution_count = input.execution_count + 1;
                }
                MsgType::Stream => {
                    let stream: Stream = msg.content_as()?;
                    match stream.name {
                        StreamName::Stdout => {
                            print!("{}", stream.text);
                            std::io::stdout().flush()?;
                        }
                        StreamName::Stderr => eprint!("{}", stream.text),
                    }
                }
                MsgType::ExecuteResult => {
                    let result: ExecuteResult = msg.content_as()?;
                    if let Some(text) = result.data.get("text/plain").and_then(|v| v.as_str()) {
                        println!("Out[{}]: {}", result.execution_count, text);
                    }
                }
                MsgType::DisplayData => {
                    let display: DisplayData = msg.content_as()?;
                    if let Some(text) = display.data.get("text/plain").and_then(|v| v.as_str()) {
                        println!("{text}");
                    }
                }
                MsgType::Error => {
                    let error: ErrorReply = msg.content_as()?;
                    eprintln!("{}: {}", error.ename, error.evalue);
                    for line in &error.traceback {
                        eprintln!("{line}");
                    }
                }
                other => {
                    tracing::debug!(msg_type = other.as_str(), "Ignoring iopub message");
                }
            }
        }

        Ok(())
    }
}
