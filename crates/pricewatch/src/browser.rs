//! Real browser control over the Chrome `DevTools` Protocol.
//!
//! [`BrowserSettings`] is always available so configuration files parse the
//! same with or without the `browser` feature. The chromiumoxide-backed
//! [`ChromiumDriver`] and [`ChromiumSessionFactory`] need the feature.

use serde::{Deserialize, Serialize};

/// Desktop Chrome user agent sent by default
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Browser launch settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// Run in headless mode
    pub headless: bool,
    /// User agent override (None = browser default)
    pub user_agent: Option<String>,
    /// Path to chromium binary (None = auto-detect)
    pub chromium_path: Option<String>,
    /// Sandbox mode (disable for containers)
    pub sandbox: bool,
    /// Viewport width
    pub viewport_width: u32,
    /// Viewport height
    pub viewport_height: u32,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            chromium_path: None,
            sandbox: true,
            viewport_width: 1280,
            viewport_height: 900,
        }
    }
}

impl BrowserSettings {
    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set user agent
    #[must_use]
    pub fn with_user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Set chromium path
    #[must_use]
    pub fn with_chromium_path(mut self, path: impl Into<String>) -> Self {
        self.chromium_path = Some(path.into());
        self
    }

    /// Disable sandbox (for containers/CI)
    #[must_use]
    pub const fn with_no_sandbox(mut self) -> Self {
        self.sandbox = false;
        self
    }

    /// Set viewport dimensions
    #[must_use]
    pub const fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }
}

// ============================================================================
// Real CDP Implementation (when `browser` feature is enabled)
// ============================================================================

#[cfg(feature = "browser")]
#[allow(
    clippy::significant_drop_tightening,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation
)]
mod cdp {
    use super::BrowserSettings;
    use crate::driver::{
        ActivateOptions, BrowsingDriver, DiagnosticArtifact, DomEvent, ElementHandle,
        SessionFactory,
    };
    use crate::locator::ElementQuery;
    use crate::result::{PriceWatchError, PriceWatchResult};
    use crate::wait::{poll_until, settle, LoadState, Polled, WaitOptions};
    use async_trait::async_trait;
    use base64::Engine as _;
    use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig};
    use chromiumoxide::cdp::browser_protocol::page::{
        CaptureScreenshotFormat, CaptureScreenshotParams,
    };
    use chromiumoxide::page::Page as CdpPage;
    use futures::StreamExt;
    use serde::de::DeserializeOwned;
    use std::fmt::Display;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Mutex;
    use tracing::{debug, info, warn};

    const ID_ATTRIBUTE: &str = "data-pricewatch-id";
    const NETWORK_IDLE_QUIET_MS: u64 = 500;

    // Assigns a stable id to each element the first time it is returned.
    const TAG_ELEMENT_JS: &str = "const tag = el => { \
        if (!el.hasAttribute('data-pricewatch-id')) { \
            window.__pricewatchSeq = (window.__pricewatchSeq || 0) + 1; \
            el.setAttribute('data-pricewatch-id', 'pw-' + window.__pricewatchSeq); \
        } \
        return { id: el.getAttribute('data-pricewatch-id'), tag_name: el.tagName.toLowerCase() }; \
    };";

    fn driver_error(e: impl Display) -> PriceWatchError {
        PriceWatchError::driver(e.to_string())
    }

    fn js_string(s: &str) -> String {
        serde_json::Value::String(s.to_string()).to_string()
    }

    fn selector_for(element: &ElementHandle) -> String {
        format!("[{ID_ATTRIBUTE}=\"{}\"]", element.id)
    }

    /// Chromium tab driven over CDP
    #[derive(Debug)]
    pub struct ChromiumDriver {
        browser: Arc<Mutex<CdpBrowser>>,
        page: CdpPage,
        handle: tokio::task::JoinHandle<()>,
    }

    impl ChromiumDriver {
        /// Launch a browser and open a blank tab
        pub async fn launch(settings: &BrowserSettings) -> PriceWatchResult<Self> {
            let mut builder = CdpConfig::builder()
                .window_size(settings.viewport_width, settings.viewport_height);

            if !settings.headless {
                builder = builder.with_head();
            }

            if !settings.sandbox {
                builder = builder.no_sandbox();
            }

            if let Some(ref path) = settings.chromium_path {
                builder = builder.chrome_executable(path);
            }

            if let Some(ref ua) = settings.user_agent {
                builder = builder.arg(format!("--user-agent={ua}"));
            }

            let cdp_config = builder.build().map_err(driver_error)?;
            let (browser, mut handler) = CdpBrowser::launch(cdp_config)
                .await
                .map_err(driver_error)?;

            let handle = tokio::spawn(async move {
                while let Some(h) = handler.next().await {
                    if h.is_err() {
                        break;
                    }
                }
            });

            let page = browser.new_page("about:blank").await.map_err(driver_error)?;
            info!(headless = settings.headless, "chromium session opened");

            Ok(Self {
                browser: Arc::new(Mutex::new(browser)),
                page,
                handle,
            })
        }

        async fn eval_json<T: DeserializeOwned>(&self, body: &str) -> PriceWatchResult<T> {
            let script = format!("JSON.stringify((() => {{ {TAG_ELEMENT_JS} {body} }})() ?? null)");
            let result = self
                .page
                .evaluate(script.as_str())
                .await
                .map_err(driver_error)?;
            let json: String = result.into_value().map_err(driver_error)?;
            serde_json::from_str(&json).map_err(driver_error)
        }

        async fn on_element<T: DeserializeOwned>(
            &self,
            element: &ElementHandle,
            body: &str,
        ) -> PriceWatchResult<T> {
            let lookup = format!(
                "const el = document.querySelector({}); \
                 if (!el) throw new Error({});",
                js_string(&selector_for(element)),
                js_string(&format!("element {element} is detached from the document")),
            );
            self.eval_json(&format!("{lookup} {body}")).await
        }

        async fn ready_state(&self) -> PriceWatchResult<String> {
            self.eval_json("return document.readyState;").await
        }
    }

    #[async_trait]
    impl BrowsingDriver for ChromiumDriver {
        async fn navigate(&self, url: &str, wait_until: LoadState) -> PriceWatchResult<()> {
            self.page.goto(url).await.map_err(|e| PriceWatchError::NavigationFailed {
                url: url.to_string(),
                message: e.to_string(),
            })?;

            let reached = poll_until(&WaitOptions::new(), move || async move {
                let state = self.ready_state().await?;
                Ok(wait_until.is_reached_by(&state).then_some(()))
            })
            .await;
            if let Polled::TimedOut { last_error, .. } = reached {
                return Err(PriceWatchError::NavigationFailed {
                    url: url.to_string(),
                    message: last_error
                        .unwrap_or_else(|| format!("document never reached {wait_until}")),
                });
            }
            if wait_until == LoadState::NetworkIdle {
                settle(Duration::from_millis(NETWORK_IDLE_QUIET_MS)).await;
            }
            debug!(url, %wait_until, "navigation complete");
            Ok(())
        }

        async fn query(&self, query: &ElementQuery) -> PriceWatchResult<Option<ElementHandle>> {
            self.eval_json(&format!(
                "const el = {}[0]; return el ? tag(el) : null;",
                query.to_js("document")
            ))
            .await
        }

        async fn query_all(&self, query: &ElementQuery) -> PriceWatchResult<Vec<ElementHandle>> {
            self.eval_json(&format!("return {}.map(tag);", query.to_js("document")))
                .await
        }

        async fn query_within(
            &self,
            parent: &ElementHandle,
            query: &ElementQuery,
        ) -> PriceWatchResult<Option<ElementHandle>> {
            self.on_element(
                parent,
                &format!(
                    "const found = {}[0]; return found ? tag(found) : null;",
                    query.to_js("el")
                ),
            )
            .await
        }

        async fn element_value(&self, element: &ElementHandle) -> PriceWatchResult<String> {
            self.on_element(element, "return el.value ?? '';").await
        }

        async fn is_enabled(&self, element: &ElementHandle) -> PriceWatchResult<bool> {
            self.on_element(
                element,
                "return !el.disabled && el.getAttribute('aria-disabled') !== 'true';",
            )
            .await
        }

        async fn attribute(
            &self,
            element: &ElementHandle,
            name: &str,
        ) -> PriceWatchResult<Option<String>> {
            self.on_element(element, &format!("return el.getAttribute({});", js_string(name)))
                .await
        }

        async fn text_content(&self, element: &ElementHandle) -> PriceWatchResult<Option<String>> {
            self.on_element(element, "return el.innerText ?? el.textContent;")
                .await
        }

        async fn fill(&self, element: &ElementHandle, value: &str) -> PriceWatchResult<()> {
            let _: bool = self
                .on_element(
                    element,
                    &format!("el.focus(); el.value = {}; return true;", js_string(value)),
                )
                .await?;
            Ok(())
        }

        async fn set_native_value(&self, element: &ElementHandle, value: &str) -> PriceWatchResult<()> {
            let _: bool = self
                .on_element(
                    element,
                    &format!(
                        "const proto = el instanceof HTMLTextAreaElement \
                             ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype; \
                         Object.getOwnPropertyDescriptor(proto, 'value').set.call(el, {}); \
                         return true;",
                        js_string(value)
                    ),
                )
                .await?;
            Ok(())
        }

        async fn dispatch_event(&self, element: &ElementHandle, event: DomEvent) -> PriceWatchResult<()> {
            let _: bool = self
                .on_element(
                    element,
                    &format!(
                        "el.dispatchEvent(new Event({}, {{ bubbles: {} }})); return true;",
                        js_string(event.as_str()),
                        event.bubbles()
                    ),
                )
                .await?;
            Ok(())
        }

        async fn focus(&self, element: &ElementHandle) -> PriceWatchResult<()> {
            let _: bool = self.on_element(element, "el.focus(); return true;").await?;
            Ok(())
        }

        async fn select_all(&self, element: &ElementHandle) -> PriceWatchResult<()> {
            let _: bool = self
                .on_element(
                    element,
                    "if (typeof el.select === 'function') { el.select(); } return true;",
                )
                .await?;
            Ok(())
        }

        async fn type_char(&self, element: &ElementHandle, ch: char) -> PriceWatchResult<()> {
            let handle = self
                .page
                .find_element(selector_for(element))
                .await
                .map_err(driver_error)?;
            handle
                .type_str(ch.to_string())
                .await
                .map_err(driver_error)?;
            Ok(())
        }

        async fn activate(&self, element: &ElementHandle, options: ActivateOptions) -> PriceWatchResult<()> {
            if options.force {
                let _: bool = self.on_element(element, "el.click(); return true;").await?;
                return Ok(());
            }
            let handle = self
                .page
                .find_element(selector_for(element))
                .await
                .map_err(driver_error)?;
            handle.click().await.map_err(driver_error)?;
            Ok(())
        }

        async fn snapshot(&self) -> PriceWatchResult<DiagnosticArtifact> {
            let mut artifact = DiagnosticArtifact::new();

            let params = CaptureScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Png)
                .build();
            match self.page.execute(params).await {
                Ok(screenshot) => {
                    let png = base64::engine::general_purpose::STANDARD
                        .decode(&screenshot.data)
                        .map_err(driver_error)?;
                    artifact = artifact.with_screenshot(png);
                }
                Err(e) => warn!(error = %e, "screenshot failed, keeping DOM only"),
            }

            let html = self.page.content().await.map_err(driver_error)?;
            artifact = artifact.with_dom(html);

            if let Ok(Some(url)) = self.page.url().await {
                artifact = artifact.with_url(url);
            }
            Ok(artifact)
        }

        async fn dispose(&self) -> PriceWatchResult<()> {
            if let Err(e) = self.page.clone().close().await {
                debug!(error = %e, "page already closed");
            }
            let mut browser = self.browser.lock().await;
            let closed = browser.close().await.map_err(driver_error);
            self.handle.abort();
            info!("chromium session closed");
            closed.map(|_| ())
        }
    }

    /// Launches one fresh Chromium instance per session
    #[derive(Debug, Clone, Default)]
    pub struct ChromiumSessionFactory {
        settings: BrowserSettings,
    }

    impl ChromiumSessionFactory {
        /// Factory using the given launch settings
        #[must_use]
        pub const fn new(settings: BrowserSettings) -> Self {
            Self { settings }
        }

        /// Launch settings
        #[must_use]
        pub const fn settings(&self) -> &BrowserSettings {
            &self.settings
        }
    }

    #[async_trait]
    impl SessionFactory for ChromiumSessionFactory {
        type Driver = ChromiumDriver;

        async fn open(&self) -> PriceWatchResult<ChromiumDriver> {
            ChromiumDriver::launch(&self.settings).await
        }
    }
}

#[cfg(feature = "browser")]
pub use cdp::{ChromiumDriver, ChromiumSessionFactory};
