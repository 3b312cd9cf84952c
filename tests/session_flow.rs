//! End-to-end session tests: channel events in, terminal bytes out.
//!
//! Interactive output is replayed through a `vt100` screen so assertions
//! read like what a user would see.

use std::sync::Arc;
use std::time::Duration;

use console_session::session::{
    run_session, ChannelEvent, ChannelOutput, ChannelRequest, DriverConfig, ManagerConfig,
    SessionManager, StatusMessage,
};
use console_session::shell::{builtins, Shell, VariableStore};
use console_session::ConsoleError;
use tokio::sync::mpsc;

struct Client {
    events: mpsc::Sender<ChannelEvent>,
    output: mpsc::Receiver<ChannelOutput>,
}

fn shell() -> Shell {
    Shell::new(
        Arc::new(builtins::registry()),
        Arc::new(VariableStore::default()),
    )
}

fn connect(manager: &Arc<SessionManager>, shell: &Shell, user: &str) -> Client {
    let guard = manager.open(user, None).unwrap();
    let (events_tx, events_rx) = mpsc::channel(64);
    let (output_tx, output_rx) = mpsc::channel(64);
    tokio::spawn(run_session(
        guard,
        shell.clone(),
        DriverConfig::default(),
        events_rx,
        output_tx,
    ));
    Client {
        events: events_tx,
        output: output_rx,
    }
}

impl Client {
    async fn request(&self, request: ChannelRequest) {
        self.events.send(ChannelEvent::Request(request)).await.unwrap();
    }

    async fn type_bytes(&self, bytes: &[u8]) {
        self.events.send(ChannelEvent::Data(bytes.to_vec())).await.unwrap();
    }

    async fn start_terminal(&self, cols: u16, rows: u16) {
        self.request(ChannelRequest::PtyReq {
            term: "xterm-256color".into(),
            cols,
            rows,
        })
        .await;
        self.request(ChannelRequest::Shell).await;
    }

    /// Output bytes and statuses up to and including `closed`.
    async fn finish(mut self) -> (Vec<u8>, Vec<StatusMessage>) {
        let mut data = Vec::new();
        let mut statuses = Vec::new();
        let collect = async {
            while let Some(message) = self.output.recv().await {
                match message {
                    ChannelOutput::Data(bytes) => data.extend(bytes),
                    ChannelOutput::Status(status) => {
                        let done = matches!(status, StatusMessage::Closed { .. });
                        statuses.push(status);
                        if done {
                            break;
                        }
                    }
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(5), collect)
            .await
            .expect("session did not close");
        (data, statuses)
    }
}

async fn exec(manager: &Arc<SessionManager>, shell: &Shell, command: &str) -> (String, i32) {
    let client = connect(manager, shell, "tester");
    client
        .request(ChannelRequest::Exec {
            command: command.to_string(),
        })
        .await;
    let (data, statuses) = client.finish().await;
    let code = statuses
        .iter()
        .find_map(|s| match s {
            StatusMessage::ExitStatus { code } => Some(*code),
            _ => None,
        })
        .expect("no exit status");
    (String::from_utf8(data).unwrap(), code)
}

fn screen(data: &[u8], rows: u16, cols: u16) -> Vec<String> {
    let mut parser = vt100::Parser::new(rows, cols, 0);
    parser.process(data);
    parser
        .screen()
        .contents()
        .lines()
        .map(|line| line.trim_end().to_string())
        .collect()
}

fn manager() -> Arc<SessionManager> {
    Arc::new(SessionManager::new(ManagerConfig::default()))
}

#[tokio::test]
async fn test_cursor_edit_before_submit() {
    let manager = manager();
    let client = connect(&manager, &shell(), "alice");
    client.start_terminal(40, 10).await;
    // "pint hi", Home, Right, insert 'r'.
    client.type_bytes(b"pint hi\x1b[H\x1b[Cr\r").await;
    client.type_bytes(b"\x04").await;

    let (data, _) = client.finish().await;
    let lines = screen(&data, 10, 40);
    assert_eq!(lines[0], "$ print hi");
    assert_eq!(lines[1], "hi");
}

#[tokio::test]
async fn test_history_recall_runs_previous_line() {
    let manager = manager();
    let client = connect(&manager, &shell(), "alice");
    client.start_terminal(40, 10).await;
    client.type_bytes(b"print one\r").await;
    client.type_bytes(b"\x1b[A\r").await;
    client.type_bytes(b"\x04").await;

    let (data, _) = client.finish().await;
    let lines = screen(&data, 10, 40);
    assert_eq!(lines[..4], ["$ print one", "one", "$ print one", "one"]);
}

#[tokio::test]
async fn test_tab_completion_then_run() {
    let manager = manager();
    let client = connect(&manager, &shell(), "alice");
    client.start_terminal(40, 10).await;
    client.type_bytes(b"pri\t hi\r").await;
    client.type_bytes(b"\x04").await;

    let (data, _) = client.finish().await;
    let lines = screen(&data, 10, 40);
    assert_eq!(lines[0], "$ print hi");
    assert_eq!(lines[1], "hi");
}

#[tokio::test]
async fn test_unknown_command_keeps_session_alive() {
    let manager = manager();
    let client = connect(&manager, &shell(), "alice");
    client.start_terminal(60, 10).await;
    client.type_bytes(b"prnt\r").await;
    client.type_bytes(b"print still here\r").await;
    client.type_bytes(b"\x04").await;

    let (data, statuses) = client.finish().await;
    let lines = screen(&data, 10, 60);
    assert_eq!(lines[1], "error: command not found: prnt");
    assert_eq!(lines[2], "did you mean: print?");
    assert_eq!(lines[4], "still here");
    assert_eq!(
        statuses,
        vec![StatusMessage::Closed {
            reason: "end of input".into()
        }]
    );
}

#[tokio::test]
async fn test_pipeline_and_sequence() {
    let manager = manager();
    let shell = shell();
    let (output, code) = exec(&manager, &shell, r#"print "a\nb\nc" | grep b; print done"#).await;
    assert_eq!(output, "b\ndone\n");
    assert_eq!(code, 0);
}

#[tokio::test]
async fn test_redirect_writes_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.txt");
    let manager = manager();
    let shell = shell();

    let (output, code) = exec(&manager, &shell, &format!("print hi > {}", path.display())).await;
    assert_eq!(output, "");
    assert_eq!(code, 0);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "hi\n");
}

#[tokio::test]
async fn test_variables_shared_between_sessions() {
    let manager = manager();
    let shell = shell();

    let (_, code) = exec(&manager, &shell, "set name world").await;
    assert_eq!(code, 0);
    let (_, code) = exec(&manager, &shell, "alias greet print hello").await;
    assert_eq!(code, 0);

    let (output, _) = exec(&manager, &shell, "greet $name").await;
    assert_eq!(output, "hello world\n");
}

#[tokio::test]
async fn test_exec_status_codes() {
    let manager = manager();
    let shell = shell();
    assert_eq!(exec(&manager, &shell, "nosuchthing").await.1, 127);
    assert_eq!(exec(&manager, &shell, "sleep").await.1, 2);
    assert_eq!(exec(&manager, &shell, "unset never_set").await.1, 1);
}

#[tokio::test]
async fn test_session_cap_and_release() {
    let manager = Arc::new(SessionManager::new(ManagerConfig {
        max_sessions: 1,
        ..ManagerConfig::default()
    }));
    let shell = shell();

    let first = connect(&manager, &shell, "alice");
    first.request(ChannelRequest::Shell).await;
    assert!(matches!(
        manager.open("bob", None),
        Err(ConsoleError::CapacityExceeded(_))
    ));

    first.events.send(ChannelEvent::Closed).await.unwrap();
    first.finish().await;
    // The guard drops after the closing status is sent.
    tokio::time::timeout(Duration::from_secs(2), async {
        while manager.count() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert!(manager.open("bob", None).is_ok());
}

#[tokio::test]
async fn test_window_change_repaints_line() {
    let manager = manager();
    let client = connect(&manager, &shell(), "alice");
    client.start_terminal(40, 10).await;
    client.type_bytes(b"print x").await;
    client
        .request(ChannelRequest::WindowChange { cols: 60, rows: 20 })
        .await;
    client.type_bytes(b"\r\x04").await;

    let (data, _) = client.finish().await;
    let lines = screen(&data, 20, 60);
    assert_eq!(lines[0], "$ print x");
    assert_eq!(lines[1], "x");
}
