//! Publication orchestrator
//!
//! Drives a draft through PDF → cover → IPFS → mint → persist. Each step is
//! triggered explicitly, checks its preconditions before touching anything,
//! leaves the state untouched when it fails, and checkpoints the state after
//! every transition. Persisted and idle sessions leave memory; the checkpoint
//! brings them back on the next request.

use crate::autosave::AutoSave;
use crate::compose::{ComposeInput, ValidatedCompose, ANONYMOUS_AUTHOR};
use crate::cover::{generate_cover, validate_upload};
use crate::errors::{PublishError, Result};
use crate::pdf::{render_article, PdfDocumentInput};
use crate::pipeline::{
    CoverArtifact, CoverSource, IpfsArtifact, MintArtifact, PdfArtifact, PinnedArticle,
    PinnedMetadata, PipelineState, PipelineStep,
};
use crate::registry::{PublicationSession, SessionHandle, SessionRegistry, SessionSnapshot};
use chrono::{Datelike, Utc};
use scholarmint_common::auth::{SessionContext, VerifiedIdentity};
use scholarmint_common::cache::CheckpointStore;
use scholarmint_common::chain::{ChainClient, RegistrationRequest};
use scholarmint_common::config::PublishingConfig;
use scholarmint_common::db::{ArticleStore, DraftStore, NewArticle, NewArticleAuthor};
use scholarmint_common::errors::{AppError, Result as AppResult};
use scholarmint_common::metadata::{content_hash, ArticleMetadataInput, MetadataBuilder};
use scholarmint_common::metrics::{record_mint, record_pinned_bytes, record_pipeline_step};
use scholarmint_common::pinning::{PinRequest, PinnedContent, PinningService};
use scholarmint_common::types::ArticleStatus;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// PDF summary without the bytes
#[derive(Debug, Clone, Serialize)]
pub struct PdfInfo {
    pub sha256: String,
    pub page_count: usize,
    pub size: usize,
}

/// Cover summary without the bytes
#[derive(Debug, Clone, Serialize)]
pub struct CoverInfo {
    pub mime: String,
    pub width: u32,
    pub height: u32,
    pub source: CoverSource,
    pub size: usize,
}

/// What the API reports for a session
#[derive(Debug, Clone, Serialize)]
pub struct PipelineView {
    pub draft_id: Uuid,
    pub stage: &'static str,
    pub compose: ComposeInput,
    pub pdf: Option<PdfInfo>,
    pub cover: Option<CoverInfo>,
    pub ipfs: Option<IpfsArtifact>,
    pub mint: Option<MintArtifact>,
    pub article_id: Option<Uuid>,
    pub doi: Option<String>,
    pub ip_asset_id: Option<String>,
}

impl PipelineView {
    pub fn from_session(session: &PublicationSession) -> Self {
        let state = session.state();
        let (article_id, doi, ip_asset_id) = match state {
            PipelineState::Persisted {
                article_id,
                doi,
                ip_asset_id,
            } => (Some(*article_id), Some(doi.clone()), Some(ip_asset_id.clone())),
            _ => (
                None,
                state.ipfs().map(|i| i.doi.clone()),
                state.mint().map(|m| m.ip_asset_id.clone()),
            ),
        };

        Self {
            draft_id: session.draft_id(),
            stage: state.stage(),
            compose: session.compose(),
            pdf: state.pdf().map(|p| PdfInfo {
                sha256: p.sha256.clone(),
                page_count: p.page_count,
                size: p.bytes.len(),
            }),
            cover: state.cover().map(|c| CoverInfo {
                mime: c.mime.clone(),
                width: c.width,
                height: c.height,
                source: c.source,
                size: c.bytes.len(),
            }),
            ipfs: state.ipfs().cloned(),
            mint: state.mint().cloned(),
            article_id,
            doi,
            ip_asset_id,
        }
    }
}

/// Author name printed and stored for the session's identity
fn author_name(identity: Option<&VerifiedIdentity>) -> String {
    identity
        .and_then(|i| i.display_name.as_deref())
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(ANONYMOUS_AUTHOR)
        .to_string()
}

fn ensure_author(ctx: &SessionContext, author_id: Uuid) -> AppResult<()> {
    if author_id == ctx.principal_id {
        Ok(())
    } else {
        Err(AppError::Forbidden {
            message: "Draft belongs to another author".to_string(),
        })
    }
}

fn authorize(
    ctx: &SessionContext,
    mut session: OwnedMutexGuard<PublicationSession>,
) -> Result<OwnedMutexGuard<PublicationSession>> {
    ensure_author(ctx, session.author_id())?;
    session.touch();
    Ok(session)
}

fn join_err(e: tokio::task::JoinError) -> AppError {
    AppError::Internal {
        message: format!("Worker task failed: {}", e),
    }
}

pub struct Publisher {
    pinning: Arc<dyn PinningService>,
    chain: Arc<dyn ChainClient>,
    articles: Arc<dyn ArticleStore>,
    drafts: Arc<dyn DraftStore>,
    checkpoints: Arc<dyn CheckpointStore>,
    metadata: MetadataBuilder,
    publishing: PublishingConfig,
    sessions: SessionRegistry,
}

impl Publisher {
    pub fn new(
        pinning: Arc<dyn PinningService>,
        chain: Arc<dyn ChainClient>,
        articles: Arc<dyn ArticleStore>,
        drafts: Arc<dyn DraftStore>,
        checkpoints: Arc<dyn CheckpointStore>,
        publishing: PublishingConfig,
    ) -> Self {
        let metadata = MetadataBuilder::from_config(&publishing, pinning.gateway_base());
        Self {
            pinning,
            chain,
            articles,
            drafts,
            checkpoints,
            metadata,
            publishing,
            sessions: SessionRegistry::new(),
        }
    }

    pub fn checkpoint_backend(&self) -> &str {
        self.checkpoints.name()
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    /// Open a new publication session
    #[instrument(skip(self, ctx, compose), fields(principal = %ctx.principal_id))]
    pub async fn start(&self, ctx: &SessionContext, compose: ComposeInput) -> Result<PipelineView> {
        let draft_id = Uuid::new_v4();
        let mut session =
            PublicationSession::new(draft_id, ctx.principal_id, compose, PipelineState::Draft);
        self.start_autosave(&mut session);
        self.checkpoint(&session).await;

        let view = PipelineView::from_session(&session);
        self.sessions.insert(session).await;

        info!(draft_id = %draft_id, "Publication session started");
        Ok(view)
    }

    /// Replace the compose fields of a session
    #[instrument(skip(self, ctx, compose), fields(draft_id = %draft_id))]
    pub async fn update(
        &self,
        ctx: &SessionContext,
        draft_id: Uuid,
        compose: ComposeInput,
    ) -> Result<PipelineView> {
        let session = self.acquire(ctx, draft_id).await?;
        if let PipelineState::Persisted { article_id, .. } = session.state() {
            return Err(PublishError::AlreadyPersisted {
                article_id: *article_id,
            });
        }

        session.set_compose(compose);
        self.checkpoint(&session).await;
        Ok(PipelineView::from_session(&session))
    }

    /// Current view of a session; waits for a running step to finish
    pub async fn status(&self, ctx: &SessionContext, draft_id: Uuid) -> Result<PipelineView> {
        let handle = self.locate(ctx, draft_id).await?;
        let session = authorize(ctx, handle.lock_owned().await)?;
        Ok(PipelineView::from_session(&session))
    }

    /// Number of sessions held in memory
    pub async fn live_sessions(&self) -> usize {
        self.sessions.len().await
    }

    /// Lock a session for one step, rejecting if another step holds it
    async fn acquire(
        &self,
        ctx: &SessionContext,
        draft_id: Uuid,
    ) -> Result<OwnedMutexGuard<PublicationSession>> {
        let handle = self.locate(ctx, draft_id).await?;
        authorize(ctx, SessionRegistry::try_acquire(handle, draft_id)?)
    }

    async fn locate(&self, ctx: &SessionContext, draft_id: Uuid) -> Result<SessionHandle> {
        match self.sessions.get(draft_id).await {
            Some(handle) => Ok(handle),
            None => self.resume(ctx, draft_id).await,
        }
    }

    /// Rebuild a session from its checkpoint, or from the saved draft
    ///
    /// Only the author's own live drafts are registered and auto-saved; a
    /// persisted session is handed back without entering the registry.
    async fn resume(&self, ctx: &SessionContext, draft_id: Uuid) -> Result<SessionHandle> {
        let snapshot = match self.checkpoints.load(draft_id).await {
            Ok(Some(value)) => match serde_json::from_value::<SessionSnapshot>(value) {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    warn!(draft_id = %draft_id, error = %e, "Discarding unreadable checkpoint");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(draft_id = %draft_id, error = %e, "Checkpoint load failed");
                None
            }
        };

        let mut session = match snapshot {
            Some(snapshot) => PublicationSession::from_snapshot(snapshot),
            None => {
                let draft = self
                    .drafts
                    .find_draft(draft_id)
                    .await?
                    .ok_or_else(|| AppError::DraftNotFound {
                        id: draft_id.to_string(),
                    })?;
                PublicationSession::new(
                    draft.id,
                    draft.author_id,
                    ComposeInput::from_draft(&draft),
                    PipelineState::Draft,
                )
            }
        };

        ensure_author(ctx, session.author_id())?;

        if session.state().is_persisted() {
            debug!(draft_id = %draft_id, "Persisted session loaded from checkpoint");
            return Ok(Arc::new(Mutex::new(session)));
        }

        self.start_autosave(&mut session);
        info!(draft_id = %draft_id, stage = session.state().stage(), "Publication session resumed");
        Ok(self.sessions.insert(session).await)
    }

    /// Drop sessions idle for at least `max_idle`, stopping their auto-save
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let evicted = self.sessions.evict_idle(max_idle).await;
        for handle in &evicted {
            let mut session = handle.lock().await;
            if let Some(autosave) = session.take_autosave() {
                autosave.stop().await;
            }
            debug!(
                draft_id = %session.draft_id(),
                idle_secs = session.idle_for().as_secs(),
                "Idle session evicted"
            );
        }
        if !evicted.is_empty() {
            info!(count = evicted.len(), "Evicted idle publication sessions");
        }
        evicted.len()
    }

    /// Sweep idle sessions in the background; a zero idle limit disables it
    pub fn spawn_eviction(self: Arc<Self>) -> Option<JoinHandle<()>> {
        let max_idle = self.publishing.session_idle();
        if max_idle.is_zero() {
            return None;
        }
        let period = (max_idle / 4).max(Duration::from_secs(1));

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.evict_idle(max_idle).await;
            }
        }))
    }

    fn start_autosave(&self, session: &mut PublicationSession) {
        let interval = self.publishing.autosave_interval();
        if interval.is_zero() {
            return;
        }
        session.set_autosave(AutoSave::spawn(
            self.drafts.clone(),
            session.draft_id(),
            session.author_id(),
            session.subscribe(),
            interval,
        ));
    }

    async fn checkpoint(&self, session: &PublicationSession) {
        let result = match serde_json::to_value(session.snapshot()) {
            Ok(value) => self.checkpoints.save(session.draft_id(), &value).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            warn!(draft_id = %session.draft_id(), error = %e, "Checkpoint save failed");
        }
    }

    async fn commit(&self, session: &mut PublicationSession, next: PipelineState) {
        debug!(
            draft_id = %session.draft_id(),
            from = session.state().stage(),
            to = next.stage(),
            "Pipeline transition"
        );
        session.set_state(next);
        self.checkpoint(session).await;
    }

    async fn timed<T>(&self, step: PipelineStep, work: impl Future<Output = Result<T>>) -> Result<T> {
        let started = Instant::now();
        let result = work.await;
        record_pipeline_step(step.as_str(), started.elapsed().as_secs_f64(), result.is_ok());
        if let Err(e) = &result {
            warn!(step = %step, error = %e, "Pipeline step rejected or failed");
        }
        result
    }

    fn validated(&self, session: &PublicationSession) -> Result<ValidatedCompose> {
        Ok(session.compose().validate(&self.publishing.default_license)?)
    }

    // ========================================================================
    // Steps
    // ========================================================================

    #[instrument(skip(self, ctx), fields(draft_id = %draft_id))]
    pub async fn generate_pdf(&self, ctx: &SessionContext, draft_id: Uuid) -> Result<PipelineView> {
        let mut session = self.acquire(ctx, draft_id).await?;
        self.timed(PipelineStep::Pdf, self.pdf_step(ctx, &mut session))
            .await?;
        Ok(PipelineView::from_session(&session))
    }

    async fn pdf_step(&self, ctx: &SessionContext, session: &mut PublicationSession) -> Result<()> {
        session.state().require(PipelineStep::Pdf)?;
        let compose = self.validated(session)?;

        let input = PdfDocumentInput {
            title: compose.title,
            author_name: author_name(ctx.verified_identity.as_ref()),
            orcid_id: ctx.verified_identity.as_ref().map(|i| i.orcid_id.clone()),
            keywords: compose.keywords,
            abstract_text: compose.abstract_text,
            content_html: compose.content_html,
            license: compose.license,
            journal_name: self.publishing.journal_name.clone(),
            year: Utc::now().year(),
        };

        let rendered = tokio::task::spawn_blocking(move || render_article(&input))
            .await
            .map_err(join_err)
            .and_then(|r| r)
            .map_err(PublishError::failed(PipelineStep::Pdf))?;

        let artifact = PdfArtifact {
            sha256: content_hash(&rendered.bytes),
            page_count: rendered.page_count,
            bytes: rendered.bytes,
        };
        info!(
            draft_id = %session.draft_id(),
            pages = artifact.page_count,
            size = artifact.bytes.len(),
            "PDF generated"
        );

        let next = session.state().clone().with_pdf(artifact)?;
        self.commit(session, next).await;
        Ok(())
    }

    /// Generate a cover, or validate `upload` and use it instead
    #[instrument(skip(self, ctx, upload), fields(draft_id = %draft_id, uploaded = upload.is_some()))]
    pub async fn generate_cover(
        &self,
        ctx: &SessionContext,
        draft_id: Uuid,
        upload: Option<Vec<u8>>,
    ) -> Result<PipelineView> {
        let mut session = self.acquire(ctx, draft_id).await?;
        self.timed(PipelineStep::Cover, self.cover_step(ctx, &mut session, upload))
            .await?;
        Ok(PipelineView::from_session(&session))
    }

    async fn cover_step(
        &self,
        ctx: &SessionContext,
        session: &mut PublicationSession,
        upload: Option<Vec<u8>>,
    ) -> Result<()> {
        session.state().require(PipelineStep::Cover)?;

        let cover: CoverArtifact = match upload {
            Some(bytes) => validate_upload(bytes, self.publishing.max_cover_bytes)?,
            None => {
                let title = self.validated(session)?.title;
                let author = author_name(ctx.verified_identity.as_ref());
                tokio::task::spawn_blocking(move || generate_cover(&title, &author))
                    .await
                    .map_err(join_err)
                    .and_then(|r| r)
                    .map_err(PublishError::failed(PipelineStep::Cover))?
            }
        };
        info!(
            draft_id = %session.draft_id(),
            mime = %cover.mime,
            size = cover.bytes.len(),
            "Cover ready"
        );

        let next = session.state().clone().with_cover(cover)?;
        self.commit(session, next).await;
        Ok(())
    }

    /// Pin the PDF, cover, article payload and both metadata documents
    #[instrument(skip(self, ctx), fields(draft_id = %draft_id))]
    pub async fn upload_to_ipfs(&self, ctx: &SessionContext, draft_id: Uuid) -> Result<PipelineView> {
        let mut session = self.acquire(ctx, draft_id).await?;
        self.timed(PipelineStep::Ipfs, self.ipfs_step(ctx, &mut session))
            .await?;
        Ok(PipelineView::from_session(&session))
    }

    async fn ipfs_step(&self, ctx: &SessionContext, session: &mut PublicationSession) -> Result<()> {
        session.state().require(PipelineStep::Ipfs)?;
        let identity = ctx.require_verified_identity()?;
        ctx.require_human_verification()?;
        let compose = self.validated(session)?;

        let (pdf, cover) = match (session.state().pdf(), session.state().cover()) {
            (Some(pdf), Some(cover)) => (pdf.clone(), cover.clone()),
            _ => {
                return Err(PublishError::StepOutOfOrder {
                    step: PipelineStep::Ipfs,
                    requires: PipelineStep::Cover,
                })
            }
        };

        let ipfs = self
            .pin_publication(session.draft_id(), &compose, identity, &pdf, &cover)
            .await
            .map_err(PublishError::failed(PipelineStep::Ipfs))?;
        info!(draft_id = %session.draft_id(), doi = %ipfs.doi, cid = %ipfs.content.cid, "Publication pinned");

        let next = session.state().clone().with_ipfs(ipfs)?;
        self.commit(session, next).await;
        Ok(())
    }

    async fn pin_publication(
        &self,
        draft_id: Uuid,
        compose: &ValidatedCompose,
        identity: &VerifiedIdentity,
        pdf: &PdfArtifact,
        cover: &CoverArtifact,
    ) -> AppResult<IpfsArtifact> {
        let issued_at = Utc::now();
        let doi = self.metadata.derive_doi(
            draft_id,
            &compose.title,
            &compose.abstract_text,
            &compose.content_html,
            issued_at,
        )?;

        let pdf_pin = self
            .pin(
                PinRequest::new(pdf.bytes.clone(), format!("article-{}.pdf", draft_id), "application/pdf"),
                "pdf",
            )
            .await?;
        let cover_pin = self
            .pin(
                PinRequest::new(
                    cover.bytes.clone(),
                    format!("cover-{}.{}", draft_id, cover.extension()),
                    cover.mime.clone(),
                ),
                "cover",
            )
            .await?;

        let article = PinnedArticle {
            title: compose.title.clone(),
            abstract_text: compose.abstract_text.clone(),
            keywords: compose.keywords.clone(),
            license: compose.license.clone(),
            publication_type: compose.publication_type,
            author_name: author_name(Some(identity)),
            orcid_id: Some(identity.orcid_id.clone()),
        };

        let bundle = self.metadata.build(&ArticleMetadataInput {
            title: article.title.clone(),
            abstract_text: article.abstract_text.clone(),
            content_html: compose.content_html.clone(),
            keywords: article.keywords.clone(),
            license: article.license.clone(),
            publication_type: article.publication_type,
            author_name: article.author_name.clone(),
            orcid_id: article.orcid_id.clone(),
            cover_cid: Some(cover_pin.cid.clone()),
            pdf_cid: Some(pdf_pin.cid.clone()),
            network: compose.network,
            doi: doi.clone(),
            issued_at,
        })?;

        let content = self
            .pin(
                PinRequest::json(bundle.article.bytes, format!("article-{}.json", draft_id)),
                "content",
            )
            .await?;
        let ip_pin = self
            .pin(
                PinRequest::json(bundle.ip_asset.bytes, format!("ip-metadata-{}.json", draft_id)),
                "ip_metadata",
            )
            .await?;
        let nft_pin = self
            .pin(
                PinRequest::json(bundle.nft.bytes, format!("nft-metadata-{}.json", draft_id)),
                "nft_metadata",
            )
            .await?;

        Ok(IpfsArtifact {
            article,
            pdf: pdf_pin,
            cover: cover_pin,
            content,
            ip_metadata: PinnedMetadata {
                pin: ip_pin,
                hash: bundle.ip_asset.hash,
            },
            nft_metadata: PinnedMetadata {
                pin: nft_pin,
                hash: bundle.nft.hash,
            },
            doi,
            network: compose.network,
            issued_at,
        })
    }

    async fn pin(&self, request: PinRequest, kind: &str) -> AppResult<PinnedContent> {
        let pinned = self.pinning.pin(request).await?;
        record_pinned_bytes(kind, pinned.size);
        debug!(kind, cid = %pinned.cid, size = pinned.size, "Pinned");
        Ok(pinned)
    }

    /// Register the pinned metadata as an IP asset
    ///
    /// A session that already minted returns its registration without
    /// calling the chain again.
    #[instrument(skip(self, ctx), fields(draft_id = %draft_id))]
    pub async fn mint(&self, ctx: &SessionContext, draft_id: Uuid) -> Result<PipelineView> {
        let mut session = self.acquire(ctx, draft_id).await?;
        self.timed(PipelineStep::Mint, self.mint_step(ctx, &mut session))
            .await?;
        Ok(PipelineView::from_session(&session))
    }

    async fn mint_step(&self, ctx: &SessionContext, session: &mut PublicationSession) -> Result<()> {
        session.state().require(PipelineStep::Mint)?;
        if let Some(existing) = session.state().mint() {
            info!(ip_asset_id = %existing.ip_asset_id, "Already minted");
            return Ok(());
        }

        let ipfs = session
            .state()
            .ipfs()
            .cloned()
            .ok_or(PublishError::StepOutOfOrder {
                step: PipelineStep::Mint,
                requires: PipelineStep::Ipfs,
            })?;

        let request = RegistrationRequest {
            network: ipfs.network,
            recipient: ctx.wallet_address.clone(),
            ip_metadata_uri: ipfs.ip_metadata.uri(),
            ip_metadata_hash: ipfs.ip_metadata.hash.clone(),
            nft_metadata_uri: ipfs.nft_metadata.uri(),
            nft_metadata_hash: ipfs.nft_metadata.hash.clone(),
        };

        let result = self.chain.register_ip_asset(&request).await;
        record_mint(ipfs.network.as_str(), result.is_ok());
        let receipt = result.map_err(PublishError::failed(PipelineStep::Mint))?;

        info!(
            draft_id = %session.draft_id(),
            chain = self.chain.name(),
            tx = %receipt.transaction_hash,
            ip_asset_id = %receipt.ip_asset_id,
            "IP asset registered"
        );

        let next = session.state().clone().with_mint(receipt)?;
        self.commit(session, next).await;
        Ok(())
    }

    /// Write the pinned article and its author, then delete the draft
    ///
    /// The row is built from what was pinned and minted, never from later
    /// edits. The session leaves memory once the row is written.
    #[instrument(skip(self, ctx), fields(draft_id = %draft_id))]
    pub async fn persist(&self, ctx: &SessionContext, draft_id: Uuid) -> Result<PipelineView> {
        let mut session = self.acquire(ctx, draft_id).await?;
        self.timed(PipelineStep::Persist, self.persist_step(ctx, &mut session))
            .await?;
        let view = PipelineView::from_session(&session);
        self.sessions.remove(draft_id).await;
        Ok(view)
    }

    async fn persist_step(&self, ctx: &SessionContext, session: &mut PublicationSession) -> Result<()> {
        session.state().require(PipelineStep::Persist)?;

        let (ipfs, mint) = match (session.state().ipfs(), session.state().mint()) {
            (Some(ipfs), Some(mint)) => (ipfs.clone(), mint.clone()),
            _ => {
                return Err(PublishError::StepOutOfOrder {
                    step: PipelineStep::Persist,
                    requires: PipelineStep::Mint,
                })
            }
        };

        if let Some(autosave) = session.take_autosave() {
            autosave.stop().await;
        }

        let pinned = ipfs.article;
        let article = NewArticle {
            id: Uuid::new_v4(),
            author_id: session.author_id(),
            title: pinned.title,
            abstract_text: pinned.abstract_text,
            keywords: pinned.keywords,
            license: Some(pinned.license),
            publication_type: pinned.publication_type,
            ipfs_hash: ipfs.content.cid.clone(),
            ipfs_gateway_url: ipfs.content.gateway_url.clone(),
            pdf_ipfs_hash: Some(ipfs.pdf.cid.clone()),
            pdf_gateway_url: Some(ipfs.pdf.gateway_url.clone()),
            cover_image_ipfs: Some(ipfs.cover.cid.clone()),
            ipa_metadata_uri: ipfs.ip_metadata.uri(),
            ipa_metadata_hash: ipfs.ip_metadata.hash.clone(),
            nft_metadata_uri: ipfs.nft_metadata.uri(),
            nft_metadata_hash: ipfs.nft_metadata.hash.clone(),
            network: mint.network,
            ip_asset_id: mint.ip_asset_id,
            transaction_hash: mint.transaction_hash,
            spg_contract_address: mint.spg_contract_address,
            minted_at: mint.minted_at,
            doi: ipfs.doi,
            wallet_address: Some(ctx.wallet_address.clone()),
            status: ArticleStatus::Published,
        };
        let authors = vec![NewArticleAuthor {
            author_name: pinned.author_name,
            author_order: 1,
            orcid_id: pinned.orcid_id,
        }];

        let saved = match self.articles.persist_publication(article, authors).await {
            Ok(saved) => saved,
            Err(e) => {
                self.start_autosave(session);
                return Err(PublishError::failed(PipelineStep::Persist)(e));
            }
        };

        match self.drafts.delete_draft(session.draft_id()).await {
            Ok(deleted) => debug!(draft_id = %session.draft_id(), deleted, "Draft removed"),
            Err(e) => warn!(draft_id = %session.draft_id(), error = %e, "Draft cleanup failed"),
        }

        info!(draft_id = %session.draft_id(), article_id = %saved.id, "Article published");

        let next = session.state().clone().into_persisted(saved.id)?;
        self.commit(session, next).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scholarmint_common::cache::MemoryCheckpoints;
    use scholarmint_common::chain::MockChainClient;
    use scholarmint_common::config::ChainConfig;
    use scholarmint_common::db::MemoryStore;
    use scholarmint_common::pinning::MockPinning;
    use scholarmint_common::types::{Network, PublicationType};

    struct Harness {
        publisher: Publisher,
        store: Arc<MemoryStore>,
        pinning: Arc<MockPinning>,
        chain: Arc<MockChainClient>,
        checkpoints: Arc<MemoryCheckpoints>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let pinning = Arc::new(MockPinning::new("https://gateway.pinata.cloud/ipfs"));
        let chain = Arc::new(MockChainClient::new(ChainConfig::default()));
        let checkpoints = Arc::new(MemoryCheckpoints::new());
        let publisher = build(&store, &pinning, &chain, &checkpoints);
        Harness {
            publisher,
            store,
            pinning,
            chain,
            checkpoints,
        }
    }

    fn build(
        store: &Arc<MemoryStore>,
        pinning: &Arc<MockPinning>,
        chain: &Arc<MockChainClient>,
        checkpoints: &Arc<MemoryCheckpoints>,
    ) -> Publisher {
        Publisher::new(
            pinning.clone(),
            chain.clone(),
            store.clone(),
            store.clone(),
            checkpoints.clone(),
            PublishingConfig {
                autosave_interval_secs: 3600,
                ..Default::default()
            },
        )
    }

    fn ctx() -> SessionContext {
        SessionContext::new(Uuid::new_v4(), "0xAbCdEf0123456789abcdef0123456789ABCDEF01")
            .unwrap()
            .with_identity(Some(VerifiedIdentity {
                orcid_id: "0000-0002-1825-0097".to_string(),
                display_name: Some("Tight Eyez".to_string()),
            }))
            .with_human_verification(true)
    }

    fn compose() -> ComposeInput {
        ComposeInput {
            title: "Krump as Embodied Research".to_string(),
            abstract_text: "Stomps, chest pops and arm swings as method.".to_string(),
            content_html: "<h2>Intro</h2><p>Body text</p>".to_string(),
            keywords: "krump, dance".to_string(),
            publication_type: PublicationType::ResearchArticle,
            license: None,
            network: Network::Testnet,
        }
    }

    async fn through_cover(h: &Harness, ctx: &SessionContext) -> Uuid {
        let draft_id = h.publisher.start(ctx, compose()).await.unwrap().draft_id;
        h.publisher.generate_pdf(ctx, draft_id).await.unwrap();
        h.publisher.generate_cover(ctx, draft_id, None).await.unwrap();
        draft_id
    }

    async fn through_mint(h: &Harness, ctx: &SessionContext) -> Uuid {
        let draft_id = through_cover(h, ctx).await;
        h.publisher.upload_to_ipfs(ctx, draft_id).await.unwrap();
        h.publisher.mint(ctx, draft_id).await.unwrap();
        draft_id
    }

    fn edited(title: &str) -> ComposeInput {
        ComposeInput {
            title: title.to_string(),
            ..compose()
        }
    }

    #[tokio::test]
    async fn test_end_to_end_publication() {
        let h = harness();
        let ctx = ctx();

        let started = h.publisher.start(&ctx, compose()).await.unwrap();
        assert_eq!(started.stage, "draft");
        let draft_id = started.draft_id;
        h.store
            .save_draft(compose().to_draft(draft_id, ctx.principal_id))
            .await
            .unwrap();

        let view = h.publisher.generate_pdf(&ctx, draft_id).await.unwrap();
        assert_eq!(view.stage, "pdf_ready");
        assert!(view.pdf.unwrap().sha256.starts_with("0x"));

        let view = h.publisher.generate_cover(&ctx, draft_id, None).await.unwrap();
        assert_eq!(view.stage, "cover_ready");

        let view = h.publisher.upload_to_ipfs(&ctx, draft_id).await.unwrap();
        assert_eq!(view.stage, "ipfs_ready");
        assert!(view.doi.unwrap().starts_with("10.KRUMPJOURNAL/article."));
        assert_eq!(h.pinning.uploads().len(), 5);

        let minted = h.publisher.mint(&ctx, draft_id).await.unwrap();
        assert_eq!(minted.stage, "minted");
        let receipt = minted.mint.unwrap();

        let again = h.publisher.mint(&ctx, draft_id).await.unwrap();
        assert_eq!(again.mint.unwrap().transaction_hash, receipt.transaction_hash);
        assert_eq!(h.chain.calls().len(), 1);

        let done = h.publisher.persist(&ctx, draft_id).await.unwrap();
        assert_eq!(done.stage, "persisted");
        let article_id = done.article_id.unwrap();

        let article = h.store.find_article(article_id).await.unwrap().unwrap();
        assert_eq!(article.status, ArticleStatus::Published.as_str());
        assert_eq!(article.ip_asset_id.as_deref(), Some(receipt.ip_asset_id.as_str()));
        assert_eq!(article.wallet_address.as_deref(), Some(ctx.wallet_lower().as_str()));

        let authors = h.store.authors_for(article_id).await.unwrap();
        assert_eq!(authors.len(), 1);
        assert_eq!(authors[0].author_name, "Tight Eyez");
        assert_eq!(authors[0].author_order, 1);

        assert!(h.store.find_draft(draft_id).await.unwrap().is_none());

        assert!(matches!(
            h.publisher.generate_pdf(&ctx, draft_id).await,
            Err(PublishError::AlreadyPersisted { article_id: id }) if id == article_id
        ));
    }

    #[tokio::test]
    async fn test_mint_before_ipfs_has_no_side_effects() {
        let h = harness();
        let ctx = ctx();
        let draft_id = through_cover(&h, &ctx).await;

        assert!(matches!(
            h.publisher.mint(&ctx, draft_id).await,
            Err(PublishError::StepOutOfOrder {
                step: PipelineStep::Mint,
                requires: PipelineStep::Ipfs
            })
        ));
        assert!(h.chain.calls().is_empty());
        assert_eq!(h.publisher.status(&ctx, draft_id).await.unwrap().stage, "cover_ready");
    }

    #[tokio::test]
    async fn test_persist_before_mint_rejected() {
        let h = harness();
        let ctx = ctx();
        let draft_id = through_cover(&h, &ctx).await;
        h.publisher.upload_to_ipfs(&ctx, draft_id).await.unwrap();

        assert!(matches!(
            h.publisher.persist(&ctx, draft_id).await,
            Err(PublishError::StepOutOfOrder {
                requires: PipelineStep::Mint,
                ..
            })
        ));
        assert_eq!(h.store.article_count().await, 0);
    }

    #[tokio::test]
    async fn test_ipfs_requires_verified_identity() {
        let h = harness();
        let ctx = ctx().with_identity(None);
        let draft_id = through_cover(&h, &ctx).await;

        let err = h.publisher.upload_to_ipfs(&ctx, draft_id).await.unwrap_err();
        assert!(matches!(err, PublishError::Rejected(AppError::Forbidden { .. })));
        assert!(h.pinning.uploads().is_empty());
    }

    #[tokio::test]
    async fn test_failed_step_keeps_state_and_can_retry() {
        let h = harness();
        let ctx = ctx();
        let draft_id = through_cover(&h, &ctx).await;

        h.pinning.fail_next("502 Bad Gateway");
        let err = h.publisher.upload_to_ipfs(&ctx, draft_id).await.unwrap_err();
        assert!(matches!(
            err,
            PublishError::StepFailed {
                step: PipelineStep::Ipfs,
                ..
            }
        ));
        assert_eq!(h.publisher.status(&ctx, draft_id).await.unwrap().stage, "cover_ready");

        let view = h.publisher.upload_to_ipfs(&ctx, draft_id).await.unwrap();
        assert_eq!(view.stage, "ipfs_ready");
    }

    #[tokio::test]
    async fn test_mint_failure_is_retryable() {
        let h = harness();
        let ctx = ctx();
        let draft_id = through_cover(&h, &ctx).await;
        h.publisher.upload_to_ipfs(&ctx, draft_id).await.unwrap();

        h.chain.fail_next("execution reverted");
        assert!(matches!(
            h.publisher.mint(&ctx, draft_id).await,
            Err(PublishError::StepFailed {
                step: PipelineStep::Mint,
                ..
            })
        ));
        assert_eq!(h.publisher.status(&ctx, draft_id).await.unwrap().stage, "ipfs_ready");
        assert_eq!(h.publisher.mint(&ctx, draft_id).await.unwrap().stage, "minted");
    }

    #[tokio::test]
    async fn test_pdf_requires_compose_fields() {
        let h = harness();
        let ctx = ctx();
        let draft_id = h
            .publisher
            .start(
                &ctx,
                ComposeInput {
                    title: "Only a title".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .draft_id;

        assert!(matches!(
            h.publisher.generate_pdf(&ctx, draft_id).await,
            Err(PublishError::Rejected(AppError::MissingField { .. }))
        ));
    }

    #[tokio::test]
    async fn test_other_principal_is_forbidden() {
        let h = harness();
        let owner = ctx();
        let draft_id = h.publisher.start(&owner, compose()).await.unwrap().draft_id;

        assert!(matches!(
            h.publisher.generate_pdf(&ctx(), draft_id).await,
            Err(PublishError::Rejected(AppError::Forbidden { .. }))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_step_rejected() {
        let h = harness();
        let ctx = ctx();
        let draft_id = h.publisher.start(&ctx, compose()).await.unwrap().draft_id;

        let handle = h.publisher.sessions.get(draft_id).await.unwrap();
        let _running = handle.lock().await;

        assert!(matches!(
            h.publisher.generate_pdf(&ctx, draft_id).await,
            Err(PublishError::StepInFlight { .. })
        ));
    }

    #[tokio::test]
    async fn test_uploaded_cover_is_validated() {
        let h = harness();
        let ctx = ctx();
        let draft_id = h.publisher.start(&ctx, compose()).await.unwrap().draft_id;
        h.publisher.generate_pdf(&ctx, draft_id).await.unwrap();

        assert!(matches!(
            h.publisher
                .generate_cover(&ctx, draft_id, Some(b"not an image".to_vec()))
                .await,
            Err(PublishError::Rejected(AppError::InvalidFormat { .. }))
        ));
    }

    #[tokio::test]
    async fn test_resume_from_checkpoint() {
        let h = harness();
        let ctx = ctx();
        let draft_id = through_cover(&h, &ctx).await;

        let restarted = build(&h.store, &h.pinning, &h.chain, &h.checkpoints);
        let view = restarted.status(&ctx, draft_id).await.unwrap();
        assert_eq!(view.stage, "cover_ready");
        assert_eq!(view.compose.title, "Krump as Embodied Research");

        let view = restarted.upload_to_ipfs(&ctx, draft_id).await.unwrap();
        assert_eq!(view.stage, "ipfs_ready");
    }

    #[tokio::test]
    async fn test_resume_from_saved_draft() {
        let h = harness();
        let ctx = ctx();
        let draft_id = Uuid::new_v4();
        h.store
            .save_draft(compose().to_draft(draft_id, ctx.principal_id))
            .await
            .unwrap();

        let view = h.publisher.status(&ctx, draft_id).await.unwrap();
        assert_eq!(view.stage, "draft");
        assert_eq!(view.compose, compose());

        assert!(matches!(
            h.publisher.status(&ctx, Uuid::new_v4()).await,
            Err(PublishError::Rejected(AppError::DraftNotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_update_after_persist_rejected() {
        let h = harness();
        let ctx = ctx();
        let draft_id = through_cover(&h, &ctx).await;
        h.publisher.upload_to_ipfs(&ctx, draft_id).await.unwrap();
        h.publisher.mint(&ctx, draft_id).await.unwrap();
        h.publisher.persist(&ctx, draft_id).await.unwrap();

        assert!(matches!(
            h.publisher.update(&ctx, draft_id, compose()).await,
            Err(PublishError::AlreadyPersisted { .. })
        ));
    }

    #[tokio::test]
    async fn test_ipfs_rerun_after_mint_rejected() {
        let h = harness();
        let ctx = ctx();
        let draft_id = through_mint(&h, &ctx).await;
        let minted_hash = h.chain.calls()[0].ip_metadata_hash.clone();

        h.publisher
            .update(&ctx, draft_id, edited("Edited after mint"))
            .await
            .unwrap();
        assert!(matches!(
            h.publisher.upload_to_ipfs(&ctx, draft_id).await,
            Err(PublishError::AlreadyMinted { .. })
        ));
        assert!(matches!(
            h.publisher.generate_pdf(&ctx, draft_id).await,
            Err(PublishError::AlreadyMinted { .. })
        ));
        assert_eq!(h.pinning.uploads().len(), 5);

        let article_id = h.publisher.persist(&ctx, draft_id).await.unwrap().article_id.unwrap();
        let article = h.store.find_article(article_id).await.unwrap().unwrap();
        assert_eq!(h.chain.calls().len(), 1);
        assert_eq!(article.ipa_metadata_hash.as_deref(), Some(minted_hash.as_str()));
    }

    #[tokio::test]
    async fn test_persist_writes_pinned_content() {
        let h = harness();
        let ctx = ctx();
        let draft_id = through_cover(&h, &ctx).await;
        h.publisher.upload_to_ipfs(&ctx, draft_id).await.unwrap();

        h.publisher
            .update(&ctx, draft_id, edited("Edited after pin"))
            .await
            .unwrap();
        h.publisher.mint(&ctx, draft_id).await.unwrap();

        let renamed = ctx.clone().with_identity(Some(VerifiedIdentity {
            orcid_id: "0000-0001-5109-3700".to_string(),
            display_name: Some("Someone Else".to_string()),
        }));
        let article_id = h
            .publisher
            .persist(&renamed, draft_id)
            .await
            .unwrap()
            .article_id
            .unwrap();

        let article = h.store.find_article(article_id).await.unwrap().unwrap();
        assert_eq!(article.title, "Krump as Embodied Research");
        assert_eq!(article.keywords, vec!["krump".to_string(), "dance".to_string()]);

        let authors = h.store.authors_for(article_id).await.unwrap();
        assert_eq!(authors[0].author_name, "Tight Eyez");
        assert_eq!(authors[0].orcid_id.as_deref(), Some("0000-0002-1825-0097"));
    }

    #[tokio::test]
    async fn test_persisted_sessions_leave_memory() {
        let h = harness();
        let ctx = ctx();

        let mut published = Vec::new();
        for _ in 0..3 {
            let draft_id = through_mint(&h, &ctx).await;
            h.publisher.persist(&ctx, draft_id).await.unwrap();
            published.push(draft_id);
        }
        assert_eq!(h.publisher.live_sessions().await, 0);

        assert!(matches!(
            h.publisher.generate_pdf(&ctx, published[0]).await,
            Err(PublishError::AlreadyPersisted { .. })
        ));
        assert_eq!(h.publisher.status(&ctx, published[1]).await.unwrap().stage, "persisted");
        assert_eq!(h.publisher.live_sessions().await, 0);
    }

    #[tokio::test]
    async fn test_idle_sessions_are_evicted() {
        let h = harness();
        let ctx = ctx();
        let draft_id = through_cover(&h, &ctx).await;
        let handle = h.publisher.sessions.get(draft_id).await.unwrap();
        assert!(handle.lock().await.has_autosave());

        assert_eq!(h.publisher.evict_idle(Duration::from_secs(3600)).await, 0);
        assert_eq!(h.publisher.evict_idle(Duration::ZERO).await, 1);
        assert_eq!(h.publisher.live_sessions().await, 0);
        assert!(!handle.lock().await.has_autosave());

        let view = h.publisher.status(&ctx, draft_id).await.unwrap();
        assert_eq!(view.stage, "cover_ready");
        assert_eq!(h.publisher.live_sessions().await, 1);
    }

    #[tokio::test]
    async fn test_ipfs_requires_world_id() {
        let h = harness();
        let ctx = ctx().with_human_verification(false);
        let draft_id = through_cover(&h, &ctx).await;

        let err = h.publisher.upload_to_ipfs(&ctx, draft_id).await.unwrap_err();
        assert!(matches!(err, PublishError::Rejected(AppError::Forbidden { .. })));
        assert!(h.pinning.uploads().is_empty());
        assert_eq!(h.publisher.status(&ctx, draft_id).await.unwrap().stage, "cover_ready");
    }

    #[tokio::test]
    async fn test_other_principal_does_not_resume_draft() {
        let h = harness();
        let owner = ctx();
        let draft_id = Uuid::new_v4();
        h.store
            .save_draft(compose().to_draft(draft_id, owner.principal_id))
            .await
            .unwrap();

        assert!(matches!(
            h.publisher.status(&ctx(), draft_id).await,
            Err(PublishError::Rejected(AppError::Forbidden { .. }))
        ));
        assert_eq!(h.publisher.live_sessions().await, 0);

        let checkpointed = through_cover(&h, &owner).await;
        let restarted = build(&h.store, &h.pinning, &h.chain, &h.checkpoints);
        assert!(matches!(
            restarted.generate_pdf(&ctx(), checkpointed).await,
            Err(PublishError::Rejected(AppError::Forbidden { .. }))
        ));
        assert_eq!(restarted.live_sessions().await, 0);
    }

    #[tokio::test]
    async fn test_status_waits_for_running_step() {
        let h = harness();
        let ctx = ctx();
        let draft_id = h.publisher.start(&ctx, compose()).await.unwrap().draft_id;

        let handle = h.publisher.sessions.get(draft_id).await.unwrap();
        let running = handle.lock_owned().await;
        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(running);
        });

        let view = h.publisher.status(&ctx, draft_id).await.unwrap();
        assert_eq!(view.stage, "draft");
        release.await.unwrap();
    }
}
