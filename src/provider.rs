use crate::{logok, logw};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// What a generation stage produced: a scratch file plus enough metadata for
/// the reconciler to place it on the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Image,
    Video,
    Audio,
}

#[derive(Debug, Clone)]
pub struct Artifact {
    pub path: PathBuf,
    pub kind: ArtifactKind,
    pub duration_secs: Option<f64>,
}

impl Artifact {
    pub fn image(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: ArtifactKind::Image,
            duration_secs: None,
        }
    }

    pub fn video(path: impl Into<PathBuf>, duration_secs: f64) -> Self {
        Self {
            path: path.into(),
            kind: ArtifactKind::Video,
            duration_secs: Some(duration_secs),
        }
    }

    pub fn audio(path: impl Into<PathBuf>, duration_secs: f64) -> Self {
        Self {
            path: path.into(),
            kind: ArtifactKind::Audio,
            duration_secs: Some(duration_secs),
        }
    }
}

/// Image-from-prompt capability request. `out` is the uniquely named scratch
/// file the winning provider writes to.
#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub prompt: String,
    pub out: PathBuf,
}

/// Clip-from-image capability request.
#[derive(Debug, Clone)]
pub struct AnimateRequest {
    pub image: PathBuf,
    pub motion_prompt: String,
    pub out: PathBuf,
}

/// Speech-from-text capability request.
#[derive(Debug, Clone)]
pub struct SpeechRequest {
    pub text: String,
    pub out: PathBuf,
}

/// Captioned-video-from-video capability request.
#[derive(Debug, Clone)]
pub struct CaptionRequest {
    pub video: PathBuf,
    pub title: String,
    pub out: PathBuf,
}

/// One interchangeable implementation of a capability ("image from prompt",
/// "clip from image", "speech from text"). Implementations do their own
/// network calls and write their output into the run scratch; any error they
/// return is treated as "try the next provider", never surfaced to the caller.
#[async_trait]
pub trait Provider<Req>: Send + Sync
where
    Req: Send + Sync,
{
    fn name(&self) -> &str;

    async fn invoke(&self, request: &Req) -> Result<Artifact>;
}

/// Delay schedule between retry attempts of a single provider.
#[derive(Debug, Clone, Copy)]
pub enum Backoff {
    Fixed(Duration),
    /// base * attempt, so successive waits grow linearly.
    Linear(Duration),
}

impl Backoff {
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(base) => base,
            Backoff::Linear(base) => base * attempt.max(1),
        }
    }
}

/// Per-provider retry limits. `max_attempts` counts invocations, not
/// re-invocations; a timeout counts as a failed attempt.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Linear(Duration::from_secs(5)),
            timeout: Duration::from_secs(180),
        }
    }
}

#[derive(Debug, Error)]
pub enum ChainConfigError {
    #[error("provider chain '{0}' has no terminal fallback")]
    MissingTerminal(String),
}

/// Ordered fallback list for one capability. Tries each real provider with its
/// retry policy, then hands the request to the terminal fallback, which must
/// be a pure local operation. `run` therefore only errors if the terminal
/// provider itself cannot touch the local filesystem.
///
/// Chains are stateless: nothing is remembered between `run` calls. A batch
/// caller that knows a provider is down can exclude it up front with
/// [`ProviderChain::with_skip_list`].
pub struct ProviderChain<Req> {
    capability: String,
    entries: Vec<(Box<dyn Provider<Req>>, RetryPolicy)>,
    terminal: Box<dyn Provider<Req>>,
    skip: HashSet<String>,
}

pub struct ProviderChainBuilder<Req> {
    capability: String,
    entries: Vec<(Box<dyn Provider<Req>>, RetryPolicy)>,
    terminal: Option<Box<dyn Provider<Req>>>,
}

impl<Req: Send + Sync> ProviderChain<Req> {
    pub fn builder(capability: impl Into<String>) -> ProviderChainBuilder<Req> {
        ProviderChainBuilder {
            capability: capability.into(),
            entries: Vec::new(),
            terminal: None,
        }
    }

    pub fn with_skip_list(mut self, skip: HashSet<String>) -> Self {
        self.skip = skip;
        self
    }

    pub async fn run(&self, request: &Req) -> Result<Artifact> {
        for (provider, policy) in &self.entries {
            if self.skip.contains(provider.name()) {
                logw(format!(
                    "{}: skipping provider {} (on skip list)",
                    self.capability,
                    provider.name()
                ));
                continue;
            }

            let attempts = policy.max_attempts.max(1);
            for attempt in 1..=attempts {
                match tokio::time::timeout(policy.timeout, provider.invoke(request)).await {
                    Ok(Ok(artifact)) => {
                        logok(format!(
                            "{}: {} succeeded (attempt {}/{})",
                            self.capability,
                            provider.name(),
                            attempt,
                            attempts
                        ));
                        return Ok(artifact);
                    }
                    Ok(Err(err)) => {
                        logw(format!(
                            "{}: {} attempt {}/{} failed: {}",
                            self.capability,
                            provider.name(),
                            attempt,
                            attempts,
                            err
                        ));
                    }
                    Err(_) => {
                        logw(format!(
                            "{}: {} attempt {}/{} timed out after {:?}",
                            self.capability,
                            provider.name(),
                            attempt,
                            attempts,
                            policy.timeout
                        ));
                    }
                }

                if attempt < attempts {
                    let delay = policy.backoff.delay(attempt);
                    tracing::debug!(
                        provider = provider.name(),
                        attempt,
                        ?delay,
                        "backing off before retry"
                    );
                    tokio::time::sleep(delay).await;
                }
            }

            logw(format!(
                "{}: {} exhausted, moving to next provider",
                self.capability,
                provider.name()
            ));
        }

        logw(format!(
            "{}: all providers exhausted, using terminal fallback {}",
            self.capability,
            self.terminal.name()
        ));
        self.terminal.invoke(request).await
    }
}

impl<Req: Send + Sync> ProviderChainBuilder<Req> {
    pub fn provider(mut self, provider: Box<dyn Provider<Req>>, policy: RetryPolicy) -> Self {
        self.entries.push((provider, policy));
        self
    }

    pub fn terminal(mut self, provider: Box<dyn Provider<Req>>) -> Self {
        self.terminal = Some(provider);
        self
    }

    /// Fails fast when no terminal fallback was supplied; that is a
    /// programming error, not a runtime condition.
    pub fn build(self) -> Result<ProviderChain<Req>, ChainConfigError> {
        let terminal = self
            .terminal
            .ok_or_else(|| ChainConfigError::MissingTerminal(self.capability.clone()))?;
        Ok(ProviderChain {
            capability: self.capability,
            entries: self.entries,
            terminal,
            skip: HashSet::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedProvider {
        name: String,
        calls: Arc<AtomicUsize>,
        succeed_on_call: Option<usize>,
        sleep: Option<Duration>,
    }

    impl ScriptedProvider {
        fn always_fails(name: &str, calls: &Arc<AtomicUsize>) -> Box<Self> {
            Box::new(Self {
                name: name.to_string(),
                calls: Arc::clone(calls),
                succeed_on_call: None,
                sleep: None,
            })
        }

        fn succeeds(name: &str, calls: &Arc<AtomicUsize>) -> Box<Self> {
            Box::new(Self {
                name: name.to_string(),
                calls: Arc::clone(calls),
                succeed_on_call: Some(1),
                sleep: None,
            })
        }

        fn hangs(name: &str, calls: &Arc<AtomicUsize>, sleep: Duration) -> Box<Self> {
            Box::new(Self {
                name: name.to_string(),
                calls: Arc::clone(calls),
                succeed_on_call: None,
                sleep: Some(sleep),
            })
        }
    }

    #[async_trait]
    impl Provider<String> for ScriptedProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn invoke(&self, _request: &String) -> Result<Artifact> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(sleep) = self.sleep {
                tokio::time::sleep(sleep).await;
            }
            match self.succeed_on_call {
                Some(n) if call >= n => Ok(Artifact::image(format!("{}.png", self.name))),
                _ => anyhow::bail!("{} scripted failure", self.name),
            }
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff: Backoff::Fixed(Duration::from_millis(1)),
            timeout: Duration::from_millis(50),
        }
    }

    #[test]
    fn builder_without_terminal_fails_fast() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = ProviderChain::<String>::builder("image")
            .provider(ScriptedProvider::succeeds("primary", &calls), fast_policy(1))
            .build();
        assert!(matches!(result, Err(ChainConfigError::MissingTerminal(_))));
    }

    #[tokio::test]
    async fn first_success_short_circuits() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let terminal = Arc::new(AtomicUsize::new(0));

        let chain: ProviderChain<String> = ProviderChain::builder("image")
            .provider(ScriptedProvider::succeeds("primary", &first), fast_policy(3))
            .provider(ScriptedProvider::succeeds("secondary", &second), fast_policy(3))
            .terminal(ScriptedProvider::succeeds("placeholder", &terminal))
            .build()
            .unwrap();

        let artifact = chain.run(&"prompt".to_string()).await.unwrap();
        assert_eq!(artifact.path, PathBuf::from("primary.png"));
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
        assert_eq!(terminal.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn exhausted_chain_lands_on_terminal() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let terminal = Arc::new(AtomicUsize::new(0));

        let chain: ProviderChain<String> = ProviderChain::builder("image")
            .provider(ScriptedProvider::always_fails("primary", &first), fast_policy(3))
            .provider(ScriptedProvider::always_fails("secondary", &second), fast_policy(2))
            .terminal(ScriptedProvider::succeeds("placeholder", &terminal))
            .build()
            .unwrap();

        let artifact = chain.run(&"prompt".to_string()).await.unwrap();
        assert_eq!(artifact.path, PathBuf::from("placeholder.png"));
        assert_eq!(first.load(Ordering::SeqCst), 3);
        assert_eq!(second.load(Ordering::SeqCst), 2);
        assert_eq!(terminal.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timed_out_primary_falls_to_secondary_once() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let terminal = Arc::new(AtomicUsize::new(0));

        let chain: ProviderChain<String> = ProviderChain::builder("tts")
            .provider(
                ScriptedProvider::hangs("kokoro", &first, Duration::from_millis(200)),
                fast_policy(3),
            )
            .provider(ScriptedProvider::succeeds("elevenlabs", &second), fast_policy(3))
            .terminal(ScriptedProvider::succeeds("silence", &terminal))
            .build()
            .unwrap();

        let artifact = chain.run(&"text".to_string()).await.unwrap();
        assert_eq!(artifact.path, PathBuf::from("elevenlabs.png"));
        assert_eq!(first.load(Ordering::SeqCst), 3);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(terminal.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn skip_list_excludes_provider_without_invoking_it() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let terminal = Arc::new(AtomicUsize::new(0));

        let mut skip = HashSet::new();
        skip.insert("primary".to_string());

        let chain: ProviderChain<String> = ProviderChain::builder("image")
            .provider(ScriptedProvider::succeeds("primary", &first), fast_policy(3))
            .provider(ScriptedProvider::succeeds("secondary", &second), fast_policy(3))
            .terminal(ScriptedProvider::succeeds("placeholder", &terminal))
            .build()
            .unwrap()
            .with_skip_list(skip);

        let artifact = chain.run(&"prompt".to_string()).await.unwrap();
        assert_eq!(artifact.path, PathBuf::from("secondary.png"));
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn linear_backoff_grows_by_attempt() {
        let backoff = Backoff::Linear(Duration::from_secs(5));
        assert_eq!(backoff.delay(1), Duration::from_secs(5));
        assert_eq!(backoff.delay(2), Duration::from_secs(10));
        assert_eq!(backoff.delay(3), Duration::from_secs(15));

        let fixed = Backoff::Fixed(Duration::from_secs(10));
        assert_eq!(fixed.delay(1), Duration::from_secs(10));
        assert_eq!(fixed.delay(7), Duration::from_secs(10));
    }
}
