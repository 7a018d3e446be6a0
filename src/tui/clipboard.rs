use anyhow::Result;
use std::sync::mpsc as std_mpsc;
use std::sync::OnceLock;
use std::time::Duration;

static CLIPBOARD_SENDER: OnceLock<std_mpsc::Sender<String>> = OnceLock::new();

/// Lazily start the thread that owns clipboard handles. Each handle is kept alive
/// briefly so X11/Wayland clipboard managers can read it after we move on.
fn clipboard_sender() -> Result<&'static std_mpsc::Sender<String>> {
    CLIPBOARD_SENDER.get_or_init(|| {
        let (tx, rx) = std_mpsc::channel::<String>();
        std::thread::Builder::new()
            .name("felica-reset-clipboard".into())
            .spawn(move || {
                for text in rx {
                    match arboard::Clipboard::new() {
                        Ok(mut clipboard) => match clipboard.set_text(&text) {
                            Ok(()) => std::thread::sleep(Duration::from_secs(2)),
                            Err(e) => tracing::warn!(error = %e, "clipboard write failed"),
                        },
                        Err(e) => tracing::warn!(error = %e, "clipboard unavailable"),
                    }
                }
            })
            .ok();
        tx
    });

    CLIPBOARD_SENDER
        .get()
        .ok_or_else(|| anyhow::anyhow!("Failed to initialize clipboard manager"))
}

/// Queue `text` for the clipboard. Returns without waiting for the write.
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    if text.is_empty() {
        anyhow::bail!("status log is empty");
    }
    clipboard_sender()?
        .send(text.to_string())
        .map_err(|_| anyhow::anyhow!("Clipboard manager channel closed"))
}
