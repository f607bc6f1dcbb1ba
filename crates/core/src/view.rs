//! Presentation: derived display values and HTML rendering.
//!
//! The page is rendered on the server. A short inline script keeps the
//! countdown cells ticking, posts new addresses and refetches the table
//! fragment after each submission.

use std::fmt;

use serde::Serialize;

use crate::stream::ContractRecord;

/// Shown in place of a quantity that cannot be computed.
const UNKNOWN: &str = "-";

/// Tokens still locked in a stream: deposited minus withdrawn.
///
/// Exact for integer base-unit amounts up to `u128::MAX`. Returns `None`
/// when either side is not a non-negative integer; clamps at zero.
pub fn remaining(deposited: &str, withdrawn: &str) -> Option<u128> {
    let deposited: u128 = deposited.trim().parse().ok()?;
    let withdrawn: u128 = withdrawn.trim().parse().ok()?;
    Some(deposited.saturating_sub(withdrawn))
}

/// Time left until a stream ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl Countdown {
    /// `None` once `end` is not in the future.
    pub fn until(end: i64, now: i64) -> Option<Self> {
        let left = end.checked_sub(now)?;
        if left <= 0 {
            return None;
        }
        Some(Self {
            days: left / 86_400,
            hours: (left / 3_600) % 24,
            minutes: (left / 60) % 60,
            seconds: left % 60,
        })
    }
}

impl fmt::Display for Countdown {
    /// Non-zero components only, e.g. `2 days 5 minutes`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = [
            (self.days, "day"),
            (self.hours, "hour"),
            (self.minutes, "minute"),
            (self.seconds, "second"),
        ];
        let mut first = true;
        for (value, unit) in parts {
            if value == 0 {
                continue;
            }
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            let plural = if value == 1 { "" } else { "s" };
            write!(f, "{value} {unit}{plural}")?;
        }
        Ok(())
    }
}

/// A stored contract plus the values the front-end derives from it.
#[derive(Debug, Clone, Serialize)]
pub struct ContractView {
    #[serde(flatten)]
    pub record: ContractRecord,
    /// Decimal string, `null` when the amounts are not integers.
    pub remaining: Option<String>,
}

impl From<ContractRecord> for ContractView {
    fn from(record: ContractRecord) -> Self {
        let remaining = remaining(&record.deposited_amount, &record.withdrawn_amount)
            .map(|v| v.to_string());
        Self { record, remaining }
    }
}

// =============================================================================
// HTML
// =============================================================================

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const EXPIRED: &str = r#"<span class="expired">Expired</span>"#;

fn render_end_cell(end: i64, now: i64) -> String {
    let content = match Countdown::until(end, now) {
        Some(countdown) => countdown.to_string(),
        None => EXPIRED.to_string(),
    };
    format!(r#"<td class="countdown" data-end="{end}">{content}</td>"#)
}

/// Table rows for `contracts`, as served by the table fragment endpoint.
pub fn render_rows(contracts: &[ContractView], now: i64) -> String {
    if contracts.is_empty() {
        return r#"<tr><td colspan="3" class="empty">No contracts yet</td></tr>"#.to_string();
    }
    let mut rows = String::new();
    for view in contracts {
        let record = &view.record;
        let remaining = view.remaining.as_deref().unwrap_or(UNKNOWN);
        rows.push_str(&format!(
            r#"<tr data-address="{address}"><td>{name}</td><td>{remaining}</td>{end}</tr>"#,
            address = escape_html(&record.address),
            name = escape_html(&record.name),
            remaining = escape_html(remaining),
            end = render_end_cell(record.end, now),
        ));
        rows.push('\n');
    }
    rows
}

/// The full page. `base_url` prefixes client-side fetches; empty means same origin.
pub fn render_page(base_url: &str, contracts: &[ContractView], now: i64) -> String {
    // JSON string literal, with `<` escaped so it cannot close the script tag.
    let base_url_literal = serde_json::Value::from(base_url.trim_end_matches('/'))
        .to_string()
        .replace('<', "\\u003c");
    PAGE_TEMPLATE
        .replace("{{BASE_URL}}", &base_url_literal)
        .replace("{{ROWS}}", &render_rows(contracts, now))
}

const PAGE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Contract Management</title>
<style>
  body { font-family: system-ui, sans-serif; margin: 0; min-height: 100vh; color: #fff;
         background: linear-gradient(90deg, #8b5cf6, #ec4899, #ef4444);
         display: flex; flex-direction: column; align-items: center; justify-content: center; padding: 1.5rem; }
  .panel { background: #1f2937; border-radius: .5rem; padding: 1.5rem; width: 100%; max-width: 56rem; margin-top: 1rem; }
  table { width: 100%; border-collapse: collapse; text-align: left; }
  th, td { padding: .5rem 1rem; }
  tbody tr { background: #374151; border-bottom: 1px solid #4b5563; }
  .expired, .error { color: #ef4444; }
  input { width: 100%; box-sizing: border-box; padding: .5rem; border-radius: .5rem; border: 0; background: #374151; color: #fff; margin-bottom: .5rem; }
  button { width: 100%; padding: .5rem; border-radius: .5rem; border: 0; background: #3b82f6; color: #fff; cursor: pointer; }
</style>
</head>
<body>
<h1>Contract Management</h1>
<div class="panel">
  <table>
    <thead><tr><th>Name</th><th>Remaining</th><th>End</th></tr></thead>
    <tbody id="contracts">
{{ROWS}}
    </tbody>
  </table>
</div>
<div class="panel">
  <form id="add-contract">
    <input id="address" type="text" placeholder="Contract Address" required>
    <button type="submit">Add Contract</button>
  </form>
  <p id="status"></p>
</div>
<script>
const BASE_URL = {{BASE_URL}};

function countdownText(end) {
  let left = Math.floor(end - Date.now() / 1000);
  if (left <= 0) return null;
  const parts = [
    [Math.floor(left / 86400), "day"],
    [Math.floor(left / 3600) % 24, "hour"],
    [Math.floor(left / 60) % 60, "minute"],
    [left % 60, "second"],
  ];
  return parts
    .filter(([value]) => value !== 0)
    .map(([value, unit]) => value + " " + unit + (value === 1 ? "" : "s"))
    .join(" ");
}

function tick() {
  for (const cell of document.querySelectorAll("td.countdown")) {
    const text = countdownText(Number(cell.dataset.end));
    if (text === null) {
      cell.innerHTML = '<span class="expired">Expired</span>';
    } else {
      cell.textContent = text;
    }
  }
}

async function refreshTable() {
  const response = await fetch(BASE_URL + "/contracts/table");
  if (!response.ok) throw new Error("Network response was not ok");
  document.getElementById("contracts").innerHTML = await response.text();
  tick();
}

document.getElementById("add-contract").addEventListener("submit", async (event) => {
  event.preventDefault();
  const status = document.getElementById("status");
  const input = document.getElementById("address");
  status.className = "";
  status.textContent = "Checking...";
  try {
    const response = await fetch(BASE_URL + "/api/check", {
      method: "POST",
      headers: { "Content-Type": "application/json" },
      body: JSON.stringify({ address: input.value }),
    });
    const body = await response.json();
    if (body.error) {
      status.className = "error";
      status.textContent = body.error;
    } else {
      status.textContent = "Contract added";
      input.value = "";
    }
    await refreshTable();
  } catch (error) {
    status.className = "error";
    status.textContent = error.message;
  }
});

setInterval(tick, 1000);
</script>
</body>
</html>
"#;

// =============================================================================
// Tests
// =============================================================================
