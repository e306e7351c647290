//! ポップアップ・モーダルの除去

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info};

use crate::engine::{js_string, AutomationEngine, IS_VISIBLE_JS};
use crate::error::ScraperError;

/// よくあるモーダルの閉じるボタン
pub const DEFAULT_CLOSE_SELECTORS: &[&str] = &[
    ".popup .close",
    ".layer_popup .btn_close",
    ".modal .close",
    "button.close",
    "[aria-label='Close']",
    "[aria-label='닫기']",
    ".x-tool-close",
];

const ESCAPE_INTERVAL_MS: u64 = 300;

/// Escape を `escape_count` 回押してから、表示中の閉じるボタンを全てクリックする
///
/// クリックしたボタンの数を返す。
pub async fn dismiss_popups(
    engine: &AutomationEngine,
    escape_count: u32,
    close_selectors: &[&str],
) -> Result<usize, ScraperError> {
    for i in 0..escape_count {
        if let Err(e) = engine.press_key("Escape").await {
            debug!("Escape press {} failed: {}", i + 1, e);
        }
        sleep(Duration::from_millis(ESCAPE_INTERVAL_MS)).await;
    }

    if close_selectors.is_empty() {
        return Ok(0);
    }

    let clicked: usize = engine.evaluate(&close_buttons_script(close_selectors)).await?;
    if clicked > 0 {
        info!("Closed {} popup(s)", clicked);
        sleep(Duration::from_millis(ESCAPE_INTERVAL_MS)).await;
    }
    Ok(clicked)
}

fn close_buttons_script(close_selectors: &[&str]) -> String {
    let selectors = close_selectors
        .iter()
        .map(|s| js_string(s))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"
        (() => {{
            const isVisible = {};
            let clicked = 0;
            for (const selector of [{}]) {{
                for (const el of document.querySelectorAll(selector)) {{
                    if (!isVisible(el)) continue;
                    el.click();
                    clicked++;
                }}
            }}
            return clicked;
        }})()
        "#,
        IS_VISIBLE_JS, selectors
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_buttons_script_quotes_selectors() {
        let script = close_buttons_script(&["[aria-label='닫기']", "a.close"]);
        assert!(script.contains(r#"["[aria-label='닫기']", "a.close"]"#));
        assert!(script.contains(IS_VISIBLE_JS));
    }
}
