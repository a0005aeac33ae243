// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared fixtures: an in-process coverage agent speaking the JaCoCo remote-control protocol,
//! and helpers to build coordinators pointed at it.

use camino::Utf8Path;
use camino_tempfile::Utf8TempDir;
use color_eyre::eyre::{Result, WrapErr};
use std::{
    io::{Read, Write},
    net::{SocketAddr, TcpListener, TcpStream},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};
use testcov_metadata::{CoverageLossLine, HashMapLine, ResultLine, RunLayout, parse_lines};
use testcov_runner::{
    agent::{
        BLOCK_CMD_OK, BLOCK_EXECUTION_DATA, BLOCK_HEADER, BLOCK_SESSION_INFO, FORMAT_VERSION,
        MAGIC_NUMBER, dump_request,
    },
    config::{
        ConfigLocation, TESTCOV_AGENT_ADDRESS_ENV, TESTCOV_AGENT_PORT_ENV, TESTCOV_BASE_DIR_ENV,
        TESTCOV_RUN_ID_ENV, TestcovConfig,
    },
    coordinator::TestCoordinator,
};

/// How the fake agent answers a dump request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgentBehavior {
    /// Send a full dump followed by command OK.
    Respond,
    /// Send part of a dump, then close the connection.
    HangUp,
    /// Accept the request but never answer.
    Stall,
    /// Answer with a header carrying the wrong magic number.
    BadMagic,
}

#[derive(Debug)]
struct AgentState {
    behavior: Mutex<AgentBehavior>,
    dumps: AtomicUsize,
}

/// A coverage agent listening on an ephemeral localhost port.
///
/// Every successful dump carries a distinct execution data block, so snapshots of different
/// tests can be told apart.
#[derive(Debug)]
pub struct FakeAgent {
    addr: SocketAddr,
    state: Arc<AgentState>,
}

impl FakeAgent {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bound fake agent listener");
        let addr = listener.local_addr().expect("fake agent has a local address");
        let state = Arc::new(AgentState {
            behavior: Mutex::new(AgentBehavior::Respond),
            dumps: AtomicUsize::new(0),
        });

        let accept_state = state.clone();
        // The accept loop lives as long as the test process.
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let state = accept_state.clone();
                thread::spawn(move || serve(stream, &state));
            }
        });

        Self { addr, state }
    }

    pub fn set_behavior(&self, behavior: AgentBehavior) {
        *self.state.behavior.lock().unwrap() = behavior;
    }

    /// The number of dumps answered.
    pub fn dumps(&self) -> usize {
        self.state.dumps.load(Ordering::SeqCst)
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// The snapshot body for the `index`th successful dump.
    pub fn expected_snapshot(index: usize) -> Vec<u8> {
        let mut out = vec![BLOCK_HEADER];
        out.extend_from_slice(&MAGIC_NUMBER.to_be_bytes());
        out.extend_from_slice(&FORMAT_VERSION.to_be_bytes());

        let session = format!("fake-agent-{index}");
        out.push(BLOCK_SESSION_INFO);
        out.extend_from_slice(&(session.len() as u16).to_be_bytes());
        out.extend_from_slice(session.as_bytes());
        out.extend_from_slice(&1_700_000_000_000i64.to_be_bytes());
        out.extend_from_slice(&1_700_000_000_500i64.to_be_bytes());

        let class = "com/example/Foo";
        out.push(BLOCK_EXECUTION_DATA);
        out.extend_from_slice(&(index as i64).to_be_bytes());
        out.extend_from_slice(&(class.len() as u16).to_be_bytes());
        out.extend_from_slice(class.as_bytes());
        // 10 probes: var-int length, then two packed bytes.
        out.push(10);
        out.extend_from_slice(&[0b0000_0101, 0b0000_0010]);
        out
    }
}

fn serve(mut stream: TcpStream, state: &AgentState) {
    let mut request = [0u8; 8];
    if stream.read_exact(&mut request).is_err() || request != dump_request(true, true) {
        return;
    }

    let behavior = *state.behavior.lock().unwrap();
    match behavior {
        AgentBehavior::Respond => {
            // Counted before replying, so a client that has its response sees the count.
            let index = state.dumps.fetch_add(1, Ordering::SeqCst);
            let mut response = FakeAgent::expected_snapshot(index);
            response.push(BLOCK_CMD_OK);
            let _ = stream.write_all(&response);
        }
        AgentBehavior::HangUp => {
            let response = FakeAgent::expected_snapshot(0);
            let _ = stream.write_all(&response[..response.len() / 2]);
        }
        AgentBehavior::Stall => {
            thread::sleep(Duration::from_secs(3));
        }
        AgentBehavior::BadMagic => {
            let _ = stream.write_all(&[BLOCK_HEADER, 0xBE, 0xEF, 0x10, 0x07]);
        }
    }
}

/// A temporary base directory plus configuration pointing at an agent.
pub struct TestEnv {
    pub temp_dir: Utf8TempDir,
    pub config: TestcovConfig,
}

impl TestEnv {
    /// Creates an environment whose config points at `port` on localhost.
    pub fn new(port: u16, run_id: &str) -> Result<Self> {
        Self::with_config_file(port, run_id, "")
    }

    /// Like [`TestEnv::new`], but also loads `config_file` as the user config.
    pub fn with_config_file(port: u16, run_id: &str, config_file: &str) -> Result<Self> {
        let temp_dir = camino_tempfile::Builder::new()
            .prefix("testcov-integration-")
            .tempdir()
            .wrap_err("failed to create temp dir")?;
        let config_path = temp_dir.path().join("testcov.toml");
        std::fs::write(&config_path, config_file).wrap_err("failed to write config file")?;

        let base_dir = temp_dir.path().join("jacoco");
        let env = |var: &str| match var {
            TESTCOV_BASE_DIR_ENV => Some(base_dir.to_string()),
            TESTCOV_RUN_ID_ENV => Some(run_id.to_owned()),
            TESTCOV_AGENT_ADDRESS_ENV => Some("127.0.0.1".to_owned()),
            TESTCOV_AGENT_PORT_ENV => Some(port.to_string()),
            _ => None,
        };
        let config = TestcovConfig::load(ConfigLocation::Explicit(&config_path), env)
            .wrap_err("failed to load config")?;
        Ok(Self { temp_dir, config })
    }

    pub fn coordinator(&self) -> Arc<TestCoordinator> {
        Arc::new(TestCoordinator::from_config(&self.config))
    }

    pub fn layout(&self) -> RunLayout {
        self.config.layout()
    }

    pub fn results(&self) -> Result<Vec<ResultLine>> {
        read_lines(&self.layout().results_file())
    }

    pub fn hash_map(&self) -> Result<Vec<HashMapLine>> {
        read_lines(&self.layout().hash_map_file())
    }

    pub fn coverage_losses(&self) -> Result<Vec<CoverageLossLine>> {
        let path = self.layout().coverage_loss_file();
        if !path.exists() {
            return Ok(Vec::new());
        }
        read_lines(&path)
    }

    /// The names of files in the raw coverage directory, sorted.
    pub fn snapshot_files(&self) -> Result<Vec<String>> {
        let raw_dir = self.layout().raw_coverage_dir();
        if !raw_dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in raw_dir.read_dir_utf8().wrap_err("failed to read raw dir")? {
            names.push(entry?.file_name().to_owned());
        }
        names.sort();
        Ok(names)
    }
}

fn read_lines<T>(path: &Utf8Path) -> Result<Vec<T>>
where
    T: std::str::FromStr<Err = testcov_metadata::LineParseError>,
{
    let contents =
        std::fs::read_to_string(path).wrap_err_with(|| format!("failed to read {path}"))?;
    parse_lines(&contents).wrap_err_with(|| format!("failed to parse {path}"))
}
