//! HTTP side of unsubscribe automation.

use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::{Client, Response};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::directive::{directive_prompt, Directive};
use super::discovery::discover_links;
use super::form::{fill_form, PageForm};
use super::page::{self, PageAction};
use super::{Attempt, Result, Strategy, UnsubscribeError, UnsubscribeReport};
use crate::config::UnsubscribeSettings;
use crate::domain::Message;
use crate::providers::ai::InferenceClient;

const ACCEPT_VALUE: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";
const ACCEPT_LANGUAGE_VALUE: &str = "en-US,en;q=0.5";
const MAX_REDIRECTS: usize = 10;

/// Runs the unsubscribe strategies against third-party pages.
pub struct UnsubscribeExecutor {
    client: Client,
    inference: Arc<dyn InferenceClient>,
}

impl UnsubscribeExecutor {
    /// Creates an executor with a browser-like HTTP client.
    pub fn new(settings: &UnsubscribeSettings, inference: Arc<dyn InferenceClient>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_VALUE));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANGUAGE_VALUE));

        let client = Client::builder()
            .user_agent(settings.user_agent.as_str())
            .default_headers(headers)
            .timeout(settings.request_timeout())
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;

        Ok(Self::with_client(client, inference))
    }

    pub fn with_client(client: Client, inference: Arc<dyn InferenceClient>) -> Self {
        Self { client, inference }
    }

    /// Unsubscribes from the sender of `message`.
    ///
    /// Candidates are tried in discovery order and the first success wins.
    /// Fails fast with [`UnsubscribeError::NoLinks`] when the body has no
    /// candidates, before any request is made.
    pub async fn unsubscribe(
        &self,
        message: &Message,
        cancel: &CancellationToken,
    ) -> Result<UnsubscribeReport> {
        let candidates = discover_links(&message.body);
        if candidates.is_empty() {
            debug!(message_id = %message.id, "no unsubscribe links");
            return Err(UnsubscribeError::NoLinks);
        }

        let mut attempts = Vec::new();
        for url in candidates {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(UnsubscribeError::Cancelled),
                outcome = self.try_candidate(&url) => outcome,
            };

            match outcome {
                Ok(strategy) => {
                    info!(
                        message_id = %message.id,
                        url = %url,
                        ?strategy,
                        "unsubscribed"
                    );
                    return Ok(UnsubscribeReport {
                        message_id: message.id.clone(),
                        succeeded_url: url.to_string(),
                        strategy,
                        attempts,
                    });
                }
                Err(e) => {
                    warn!(message_id = %message.id, url = %url, error = %e, "unsubscribe candidate failed");
                    attempts.push(Attempt {
                        url: url.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        Err(UnsubscribeError::AllCandidatesFailed { attempts })
    }

    async fn try_candidate(&self, url: &Url) -> Result<Strategy> {
        let (page_url, html) = self.fetch_page(url).await?;

        match page::analyze(&html) {
            Some(action) => {
                let strategy = match action {
                    PageAction::SubmitForm(_) => Strategy::Form,
                    PageAction::FollowLink(_) => Strategy::Link,
                };
                self.perform(&action, &page_url).await?;
                Ok(strategy)
            }
            None => {
                self.follow_directive(&page_url, &html).await?;
                Ok(Strategy::Ai)
            }
        }
    }

    async fn follow_directive(&self, page_url: &Url, html: &str) -> Result<()> {
        let reply = self
            .inference
            .ask(&directive_prompt(page_url.as_str(), html))
            .await?;
        let directive = Directive::parse(&reply)
            .ok_or_else(|| UnsubscribeError::UnrecognizedDirective(reply.trim().to_string()))?;
        debug!(url = %page_url, %directive, "model directive");

        let (selector, prefer_link) = match &directive {
            Directive::Confirmed => return Ok(()),
            Directive::Click(selector) => (selector, true),
            Directive::Form(selector) => (selector, false),
        };

        let (page_url, html) = self.fetch_page(page_url).await?;
        let action = page::select_target(&html, selector, prefer_link)
            .map_err(UnsubscribeError::Parse)?
            .ok_or_else(|| UnsubscribeError::ElementNotFound(selector.clone()))?;

        self.perform(&action, &page_url).await
    }

    async fn perform(&self, action: &PageAction, page_url: &Url) -> Result<()> {
        match action {
            PageAction::SubmitForm(form) => self.submit_form(form, page_url).await,
            PageAction::FollowLink(href) => {
                let target = resolve(page_url, href)?;
                debug!(url = %target, "following unsubscribe link");
                ensure_success(self.client.get(target).send().await?)?;
                Ok(())
            }
        }
    }

    async fn fetch_page(&self, url: &Url) -> Result<(Url, String)> {
        debug!(url = %url, "fetching unsubscribe page");
        let response = ensure_success(self.client.get(url.clone()).send().await?)?;
        let final_url = response.url().clone();
        Ok((final_url, response.text().await?))
    }

    async fn submit_form(&self, form: &PageForm, page_url: &Url) -> Result<()> {
        let mut target = if form.action.is_empty() {
            page_url.clone()
        } else {
            resolve(page_url, &form.action)?
        };
        let pairs = fill_form(form);
        debug!(url = %target, method = %form.method, fields = pairs.len(), "submitting unsubscribe form");

        let request = if form.is_post() {
            self.client.post(target).form(&pairs)
        } else {
            if !pairs.is_empty() {
                target.query_pairs_mut().extend_pairs(pairs.iter());
            }
            self.client.get(target)
        };

        ensure_success(request.send().await?)?;
        Ok(())
    }
}

/// Resolves an href or form action against the page it came from.
fn resolve(base: &Url, reference: &str) -> Result<Url> {
    let url = base
        .join(reference.trim())
        .map_err(|e| UnsubscribeError::Parse(format!("invalid url {reference:?}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(UnsubscribeError::Parse(format!("unsupported scheme {other}"))),
    }
}

fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(UnsubscribeError::Status {
            url: response.url().to_string(),
            status: status.as_u16(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OwnerId;
    use crate::providers::ai::MockInferenceClient;
    use chrono::Utc;
    use mockito::{Matcher, Server};
    use pretty_assertions::assert_eq;

    fn executor(inference: MockInferenceClient) -> UnsubscribeExecutor {
        UnsubscribeExecutor::new(&UnsubscribeSettings::default(), Arc::new(inference)).unwrap()
    }

    fn message(body: String) -> Message {
        Message::new(
            OwnerId::from("owner-1"),
            "gm-1",
            "News <news@example.com>",
            "Weekly",
            body,
            Utc::now(),
        )
    }

    fn no_model() -> MockInferenceClient {
        let mut inference = MockInferenceClient::new();
        inference.expect_ask().never();
        inference
    }

    #[tokio::test]
    async fn failing_link_falls_through_to_form_without_model() {
        let mut server = Server::new_async().await;
        let base = server.url();

        let broken = server
            .mock("GET", "/unsubscribe/a")
            .with_status(500)
            .create_async()
            .await;
        let page = server
            .mock("GET", "/unsubscribe/b")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body(
                r#"<form action="/unsubscribe/done" method="post">
                     <input type="hidden" name="token" value="t1">
                     <input type="text" name="email">
                     <input type="submit" value="Unsubscribe">
                   </form>"#,
            )
            .create_async()
            .await;
        let submit = server
            .mock("POST", "/unsubscribe/done")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("token".into(), "t1".into()),
                Matcher::UrlEncoded("email".into(), "user@example.com".into()),
            ]))
            .with_status(200)
            .create_async()
            .await;

        let body = format!(
            r#"<a href="{base}/unsubscribe/a">Unsubscribe</a> <a href="{base}/unsubscribe/b">Opt out</a>"#
        );
        let report = executor(no_model())
            .unsubscribe(&message(body), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.strategy, Strategy::Form);
        assert_eq!(report.succeeded_url, format!("{base}/unsubscribe/b"));
        assert_eq!(report.attempts.len(), 1);
        assert!(report.attempts[0].error.contains("500"));
        broken.assert_async().await;
        page.assert_async().await;
        submit.assert_async().await;
    }

    #[tokio::test]
    async fn get_form_appends_query() {
        let mut server = Server::new_async().await;
        let base = server.url();

        server
            .mock("GET", "/unsubscribe")
            .with_status(200)
            .with_body(r#"<form action="confirm"><input name="unsub"></form>"#)
            .create_async()
            .await;
        let confirm = server
            .mock("GET", "/confirm")
            .match_query(Matcher::UrlEncoded("unsub".into(), "true".into()))
            .with_status(200)
            .create_async()
            .await;

        let report = executor(no_model())
            .unsubscribe(
                &message(format!("Stop: {base}/unsubscribe")),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.strategy, Strategy::Form);
        confirm.assert_async().await;
    }

    #[tokio::test]
    async fn labelled_anchor_is_followed() {
        let mut server = Server::new_async().await;
        let base = server.url();

        server
            .mock("GET", "/unsubscribe")
            .with_status(200)
            .with_body(r#"<p>Manage</p><a href="/bye">Click here to unsubscribe</a>"#)
            .create_async()
            .await;
        let bye = server
            .mock("GET", "/bye")
            .with_status(200)
            .create_async()
            .await;

        let report = executor(no_model())
            .unsubscribe(
                &message(format!("{base}/unsubscribe")),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.strategy, Strategy::Link);
        assert!(report.attempts.is_empty());
        bye.assert_async().await;
    }

    #[tokio::test]
    async fn model_click_directive_refetches_and_follows() {
        let mut server = Server::new_async().await;
        let base = server.url();

        let page = server
            .mock("GET", "/unsubscribe")
            .with_status(200)
            .with_body(r#"<div><a id="leave" href="/gone">Leave this list</a></div>"#)
            .expect(2)
            .create_async()
            .await;
        let gone = server
            .mock("GET", "/gone")
            .with_status(200)
            .create_async()
            .await;

        let mut inference = MockInferenceClient::new();
        inference
            .expect_ask()
            .withf(|prompt| prompt.contains("/unsubscribe") && prompt.contains("Leave this list"))
            .times(1)
            .returning(|_| Ok("CLICK:#leave".to_string()));

        let report = executor(inference)
            .unsubscribe(
                &message(format!("{base}/unsubscribe")),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.strategy, Strategy::Ai);
        page.assert_async().await;
        gone.assert_async().await;
    }

    #[tokio::test]
    async fn confirmed_page_is_success() {
        let mut server = Server::new_async().await;
        let base = server.url();
        server
            .mock("GET", "/unsubscribe")
            .with_status(200)
            .with_body("<h1>You have been removed from our list.</h1>")
            .create_async()
            .await;

        let mut inference = MockInferenceClient::new();
        inference
            .expect_ask()
            .times(1)
            .returning(|_| Ok("CONFIRMED".to_string()));

        let report = executor(inference)
            .unsubscribe(
                &message(format!("{base}/unsubscribe")),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(report.strategy, Strategy::Ai);
    }

    #[tokio::test]
    async fn unrecognized_directive_fails_candidate() {
        let mut server = Server::new_async().await;
        let base = server.url();
        server
            .mock("GET", "/unsubscribe")
            .with_status(200)
            .with_body("<p>Hello</p>")
            .create_async()
            .await;

        let mut inference = MockInferenceClient::new();
        inference
            .expect_ask()
            .returning(|_| Ok("Run this script: rm -rf /".to_string()));

        let err = executor(inference)
            .unsubscribe(
                &message(format!("{base}/unsubscribe")),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        let UnsubscribeError::AllCandidatesFailed { attempts } = err else {
            panic!("expected aggregated failure, got {err:?}");
        };
        assert_eq!(attempts.len(), 1);
        assert!(attempts[0].error.contains("unrecognized directive"));
    }

    #[tokio::test]
    async fn no_links_fails_fast() {
        let executor = UnsubscribeExecutor::with_client(Client::new(), Arc::new(no_model()));
        let err = executor
            .unsubscribe(
                &message("<p>See you at lunch</p>".to_string()),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, UnsubscribeError::NoLinks));
    }

    #[tokio::test]
    async fn cancelled_before_first_candidate() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = executor(no_model())
            .unsubscribe(
                &message("https://news.example.com/unsubscribe".to_string()),
                &cancel,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, UnsubscribeError::Cancelled));
    }

    #[test]
    fn resolve_rejects_non_http() {
        let base = Url::parse("https://a.example.com/u/page").unwrap();
        assert_eq!(
            resolve(&base, "../done").unwrap().as_str(),
            "https://a.example.com/done"
        );
        assert!(resolve(&base, "javascript:void(0)").is_err());
    }
}
