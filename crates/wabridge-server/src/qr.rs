use chrono::{DateTime, Utc};
use qrcode::render::svg;
use qrcode::QrCode;
use tokio::sync::Mutex;

/// The at-most-one current pairing code. Created when pairing starts,
/// replaced on each refresh, destroyed on pairing success.
#[derive(Default)]
pub struct QrState {
    inner: Mutex<Option<QrEntry>>,
}

#[derive(Clone)]
struct QrEntry {
    code: String,
    updated_at: DateTime<Utc>,
}

impl QrState {
    pub async fn set(&self, code: impl Into<String>) {
        *self.inner.lock().await = Some(QrEntry {
            code: code.into(),
            updated_at: Utc::now(),
        });
    }

    pub async fn clear(&self) {
        *self.inner.lock().await = None;
    }

    pub async fn has_code(&self) -> bool {
        self.inner.lock().await.is_some()
    }

    pub async fn latest(&self) -> Option<(String, DateTime<Utc>)> {
        self.inner
            .lock()
            .await
            .clone()
            .map(|entry| (entry.code, entry.updated_at))
    }
}

/// Render a pairing code as an inline SVG for the `/qr` page.
pub fn render_svg(code: &str) -> Option<String> {
    let qr = QrCode::new(code.as_bytes()).ok()?;
    Some(
        qr.render::<svg::Color>()
            .min_dimensions(260, 260)
            .quiet_zone(true)
            .build(),
    )
}

/// Print the pairing code to the terminal for headless setups.
pub fn print_terminal(code: &str) {
    if let Err(error) = qr2term::print_qr(code) {
        tracing::warn!(%error, "failed to render QR code on terminal");
    }
}
