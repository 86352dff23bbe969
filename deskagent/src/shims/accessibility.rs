//! Accessibility backend shim: spawns the platform accessibility binary once
//! per call and parses its JSON-over-stdout replies (§6).

use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use deskagent_agent::errors::AxError;
use deskagent_agent::ports::{AccessibilityBackend, SearchHit};
use deskagent_agent::types::{Bounds, Element, StateSnapshot};
use serde::Deserialize;
use tokio::process::Command;
use tokio::time::timeout;

pub struct SubprocessAccessibility {
    backend_bin: String,
    query_timeout: Duration,
    search_timeout: Duration,
    snapshot_timeout: Duration,
}

impl SubprocessAccessibility {
    pub fn new(backend_bin: String, query_timeout_ms: u64, search_timeout_ms: u64, snapshot_timeout_ms: u64) -> Self {
        Self {
            backend_bin,
            query_timeout: Duration::from_millis(query_timeout_ms),
            search_timeout: Duration::from_millis(search_timeout_ms),
            snapshot_timeout: Duration::from_millis(snapshot_timeout_ms),
        }
    }

    async fn run(&self, args: &[String], bound: Duration) -> Result<String> {
        let child = Command::new(&self.backend_bin)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| AxError::SpawnFailed(e.to_string()))?;
        let output = timeout(bound, child.wait_with_output())
            .await
            .map_err(|_| AxError::Timeout(bound.as_millis() as u64))?
            .context("accessibility backend exited abnormally")?;
        if !output.status.success() {
            return Err(AxError::SpawnFailed(format!("backend exited with {}", output.status)).into());
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotResponse {
    success: bool,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    focused_application: Option<String>,
    #[serde(default)]
    focused_window: Option<String>,
    #[serde(default)]
    focused_element: Option<Element>,
    #[serde(default)]
    element_at_point: Option<Element>,
    #[serde(default)]
    windows: Vec<String>,
    #[serde(default)]
    open_menus: Vec<String>,
    #[serde(default)]
    tabs: Vec<String>,
    #[serde(default)]
    sheets: Vec<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    success: bool,
    #[serde(default)]
    element_at_point: Option<Element>,
    #[serde(default)]
    nearby_elements: Vec<RawSearchHit>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct RawSearchHit {
    role: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    bounds: Option<Bounds>,
    #[serde(default)]
    similarity: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    success: bool,
    #[serde(default)]
    results: Vec<RawSearchHit>,
    #[serde(default)]
    error: Option<String>,
}

#[async_trait]
impl AccessibilityBackend for SubprocessAccessibility {
    async fn capture_state(&self, point: Option<(i32, i32)>) -> Result<StateSnapshot> {
        let mut args = vec!["--snapshot".to_string()];
        if let Some((x, y)) = point {
            args.push("--x".to_string());
            args.push(x.to_string());
            args.push("--y".to_string());
            args.push(y.to_string());
        }
        let raw = self.run(&args, self.snapshot_timeout).await?;
        let parsed: SnapshotResponse = serde_json::from_str(&raw).context("parsing snapshot response")?;
        if !parsed.success {
            return Err(AxError::MalformedOutput(parsed.error.unwrap_or_default()).into());
        }
        Ok(StateSnapshot {
            timestamp: parsed.timestamp.unwrap_or_default(),
            focused_application: parsed.focused_application,
            focused_window: parsed.focused_window,
            focused_element: parsed.focused_element,
            element_at_point: parsed.element_at_point,
            windows: parsed.windows,
            open_menus: parsed.open_menus,
            tabs: parsed.tabs,
            sheets: parsed.sheets,
            selections: Vec::new(),
        })
    }

    async fn element_at_point(&self, x: i32, y: i32) -> Result<Option<Element>> {
        let args = vec!["--x".to_string(), x.to_string(), "--y".to_string(), y.to_string(), "--count".to_string(), "1".to_string(), "--distance".to_string(), "50".to_string()];
        let raw = self.run(&args, self.query_timeout).await?;
        let parsed: QueryResponse = serde_json::from_str(&raw).context("parsing query response")?;
        if !parsed.success {
            return Err(AxError::MalformedOutput(parsed.error.unwrap_or_default()).into());
        }
        Ok(parsed.element_at_point)
    }

    async fn nearby_elements(&self, x: i32, y: i32, count: usize, distance: u32) -> Result<Vec<SearchHit>> {
        let args = vec![
            "--x".to_string(),
            x.to_string(),
            "--y".to_string(),
            y.to_string(),
            "--count".to_string(),
            count.to_string(),
            "--distance".to_string(),
            distance.to_string(),
        ];
        let raw = self.run(&args, self.query_timeout).await?;
        let parsed: QueryResponse = serde_json::from_str(&raw).context("parsing query response")?;
        if !parsed.success {
            return Err(AxError::MalformedOutput(parsed.error.unwrap_or_default()).into());
        }
        Ok(parsed.nearby_elements.into_iter().map(|r| SearchHit { role: r.role, title: r.title, bounds: r.bounds, similarity: r.similarity }).collect())
    }

    async fn search(&self, keyword: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let args = vec!["--search".to_string(), keyword.to_string(), "--count".to_string(), max_results.to_string()];
        let raw = self.run(&args, self.search_timeout).await?;
        let parsed: SearchResponse = serde_json::from_str(&raw).context("parsing search response")?;
        if !parsed.success {
            return Err(AxError::MalformedOutput(parsed.error.unwrap_or_default()).into());
        }
        Ok(parsed.results.into_iter().map(|r| SearchHit { role: r.role, title: r.title, bounds: r.bounds, similarity: r.similarity }).collect())
    }
}
