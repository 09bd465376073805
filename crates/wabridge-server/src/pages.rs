//! Embedded HTML for the `/qr` pairing page and the `/status` dashboard.

use chrono::{DateTime, Utc};

use crate::qr;

/// Pairing page: shows the latest QR inline, polls `/api/status` every two
/// seconds and hides itself once the device is authenticated.
pub fn qr_page(authenticated: bool, latest: Option<(String, DateTime<Utc>)>) -> String {
    let body = if authenticated {
        r#"<p class="ok">Device is linked. No pairing needed.</p>"#.to_string()
    } else {
        match latest {
            Some((code, updated_at)) => {
                let svg = qr::render_svg(&code).unwrap_or_default();
                format!(
                    r#"<div id="qr">{svg}</div>
    <p>Scan with WhatsApp &gt; Linked devices. Refreshed {updated}.</p>"#,
                    updated = updated_at.format("%H:%M:%S UTC"),
                )
            }
            None => r#"<p>Waiting for a pairing code from WhatsApp&hellip;</p>"#.to_string(),
        }
    };

    format!(
        r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>wabridge pairing</title>
<style>
  body {{ font-family: sans-serif; max-width: 40rem; margin: 3rem auto; text-align: center; }}
  .ok {{ color: #2a7a2a; font-weight: bold; }}
  #qr svg {{ width: 260px; height: 260px; }}
</style>
</head>
<body>
<h1>Pair this bridge</h1>
{body}
<script>
setInterval(async () => {{
  try {{
    const res = await fetch('/api/status');
    const status = await res.json();
    if (status.authenticated) {{
      document.body.innerHTML = '<h1>Pair this bridge</h1><p class="ok">Device is linked.</p>';
    }} else {{
      location.reload();
    }}
  }} catch (e) {{ /* bridge restarting */ }}
}}, 2000);
</script>
</body>
</html>"#
    )
}

/// Dashboard: renders `/api/status` and refreshes every 30 seconds.
pub const STATUS_PAGE: &str = r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>wabridge status</title>
<style>
  body { font-family: sans-serif; max-width: 44rem; margin: 3rem auto; }
  table { border-collapse: collapse; width: 100%; }
  td, th { border: 1px solid #ccc; padding: .4rem .6rem; text-align: left; }
  .ok { color: #2a7a2a; }
  .bad { color: #a33; }
</style>
</head>
<body>
<h1>wabridge</h1>
<table id="status"><tr><td>Loading&hellip;</td></tr></table>
<p><a href="/qr">Pairing page</a></p>
<script>
async function refresh() {
  try {
    const res = await fetch('/api/status');
    const s = await res.json();
    const flag = v => v ? '<span class="ok">yes</span>' : '<span class="bad">no</span>';
    const rows = [
      ['Ready', flag(s.ready)],
      ['Authenticated', flag(s.authenticated)],
      ['Connected', flag(s.connected)],
      ['Messages DB', flag(s.messages_db_ok)],
      ['Sessions DB', flag(s.sessions_db_ok)],
      ['Chats', s.chats],
      ['Messages', s.messages],
      ['DB size (bytes)', s.db_size_bytes],
      ['Event errors', s.event_errors],
      ['Last sync', s.last_sync_at || '-'],
      ['Last error', s.last_error ? `${s.last_error.message} (${s.last_error.at})` : '-'],
      ['Session backup', s.backup],
    ];
    document.getElementById('status').innerHTML =
      rows.map(([k, v]) => `<tr><th>${k}</th><td>${v}</td></tr>`).join('');
  } catch (e) {
    document.getElementById('status').innerHTML =
      '<tr><td class="bad">bridge unreachable</td></tr>';
  }
}
refresh();
setInterval(refresh, 30000);
</script>
</body>
</html>"#;
