//! Checkpointed collection pipeline.
//!
//! Coordinates the full `harvest collect` flow: enumerate accounts → page
//! through each account's posts → filter → batched CSV append → checkpoint.
//! A run that is interrupted leaves its checkpoint behind; the next run
//! given that checkpoint skips completed accounts and resumes the rest at
//! their saved offsets.
//!
//! # Durability
//!
//! Accepted rows are buffered per account. The buffer is flushed when it
//! reaches `flush_rows`, when the offset has advanced `checkpoint_every`
//! since the last save, and when the account ends. Every checkpoint save
//! follows a flush, so the saved offset always covers exactly the rows that
//! are already on disk.
//!
//! # Failures
//!
//! A rejected or failed page stops that account only. The account is
//! recorded as partial at the offset of the failed page and picked up there
//! by the next run; the rest of the run continues. Errors writing the output
//! table or the checkpoint are fatal and propagate.

use anyhow::{bail, Result};
use chrono::{Local, Utc};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::accounts::{enumerate_accounts, resolve_accounts};
use crate::checkpoint::{
    discover_latest, run_file_names, AccountStatus, Checkpoint, CheckpointStore,
};
use crate::config::{CollectConfig, Config};
use crate::connector_rest::RestSource;
use crate::filter::{ContentFilter, Verdict};
use crate::models::{decorate_post, post_text, Account, PostRow};
use crate::paging::PagingEnd;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::traits::{Page, PostSource};
use crate::writer::CsvSink;

/// How one account's fetch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountOutcome {
    Completed,
    /// Stopped early at `offset`; `reason` says why.
    Partial { offset: u64, reason: String },
}

/// Counters for one run (not cumulative across resumes).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectSummary {
    pub accounts_total: usize,
    pub accounts_skipped: usize,
    pub accounts_completed: usize,
    pub accounts_partial: usize,
    pub processed: u64,
    pub kept: u64,
    pub filtered: u64,
    pub rows_written: u64,
}

/// Tunables the loop needs, lifted from `[api]` and `[collect]`.
#[derive(Debug, Clone)]
pub struct CollectSettings {
    pub page_size: u64,
    pub flush_rows: usize,
    pub checkpoint_every: u64,
}

impl CollectSettings {
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.api.page_size, &config.collect)
    }

    pub fn new(page_size: u64, collect: &CollectConfig) -> Self {
        Self {
            page_size,
            flush_rows: collect.flush_rows,
            checkpoint_every: collect.checkpoint_every,
        }
    }
}

/// Drives accounts through fetch, filter, write and checkpoint.
pub struct Collector<'a> {
    source: &'a dyn PostSource,
    filter: ContentFilter,
    settings: CollectSettings,
    store: CheckpointStore,
    sink: CsvSink,
    reporter: &'a dyn ProgressReporter,
}

impl<'a> Collector<'a> {
    pub fn new(
        source: &'a dyn PostSource,
        filter: ContentFilter,
        settings: CollectSettings,
        store: CheckpointStore,
        sink: CsvSink,
        reporter: &'a dyn ProgressReporter,
    ) -> Self {
        Self {
            source,
            filter,
            settings,
            store,
            sink,
            reporter,
        }
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    pub fn sink(&self) -> &CsvSink {
        &self.sink
    }

    /// Collect every account not yet completed in `state`.
    ///
    /// Deletes the checkpoint when every account has completed; otherwise
    /// leaves it for the next run.
    pub async fn run(
        &self,
        accounts: &[Account],
        state: &mut Checkpoint,
    ) -> Result<CollectSummary> {
        let mut summary = CollectSummary {
            accounts_total: accounts.len(),
            ..Default::default()
        };

        for (i, account) in accounts.iter().enumerate() {
            let status = state.status(&account.handle);
            let Some(start) = status.resume_offset() else {
                summary.accounts_skipped += 1;
                continue;
            };

            self.reporter.report(ProgressEvent::Account {
                handle: account.handle.clone(),
                index: i + 1,
                total: accounts.len(),
                offset: start,
            });

            match self.collect_account(account, start, state, &mut summary).await? {
                AccountOutcome::Completed => summary.accounts_completed += 1,
                AccountOutcome::Partial { offset, reason } => {
                    warn!(handle = %account.handle, offset, %reason, "account stopped early; will resume next run");
                    summary.accounts_partial += 1;
                }
            }
        }

        if state.is_settled() {
            self.store.remove()?;
            info!(path = %self.store.path().display(), "collection complete, checkpoint removed");
        }

        Ok(summary)
    }

    /// Page through one account from `start`.
    ///
    /// Fetch failures end the account as [`AccountOutcome::Partial`]; only
    /// output and checkpoint I/O errors are returned as `Err`.
    pub async fn collect_account(
        &self,
        account: &Account,
        start: u64,
        state: &mut Checkpoint,
        summary: &mut CollectSummary,
    ) -> Result<AccountOutcome> {
        let handle = account.handle.as_str();
        let page_size = self.settings.page_size;

        state.begin(handle, start);
        self.store.save(state)?;

        let mut offset = start;
        let mut last_saved = start;
        let mut buffer: Vec<PostRow> = Vec::new();
        let mut processed = 0u64;
        let mut kept = 0u64;
        let mut filtered = 0u64;

        loop {
            let page = match self.source.posts_page(account, offset, page_size).await {
                Ok(Page::Items(rows)) => rows,
                Ok(Page::Rejected(status)) => {
                    let reason = format!("HTTP {}", status);
                    return self.stop_partial(account, offset, reason, &mut buffer, state, summary);
                }
                Err(e) => {
                    let reason = format!("{:#}", e);
                    return self.stop_partial(account, offset, reason, &mut buffer, state, summary);
                }
            };

            let n = page.len() as u64;
            let collected_at = Utc::now();
            let mut page_kept = 0u64;
            let mut page_filtered = 0u64;
            for row in page {
                let mut row = match row {
                    Value::Object(map) => map,
                    other => {
                        warn!(handle, row = %other, "skipping non-object post row");
                        page_filtered += 1;
                        continue;
                    }
                };
                match self.filter.evaluate(post_text(&row)) {
                    Verdict::Keep => {
                        decorate_post(&mut row, handle, collected_at);
                        buffer.push(row);
                        page_kept += 1;
                    }
                    Verdict::Reject(reason) => {
                        debug!(handle, %reason, "post filtered");
                        page_filtered += 1;
                    }
                }
            }

            processed += n;
            kept += page_kept;
            filtered += page_filtered;
            summary.processed += n;
            summary.kept += page_kept;
            summary.filtered += page_filtered;
            state.total_processed += n;
            state.total_kept += page_kept;
            state.total_filtered += page_filtered;
            offset += page_size;

            self.reporter.report(ProgressEvent::Page {
                handle: handle.to_string(),
                processed,
                kept,
                filtered,
            });

            if n < page_size {
                self.flush(&mut buffer, summary)?;
                state.complete(handle);
                self.store.save(state)?;
                return Ok(AccountOutcome::Completed);
            }

            state.current_offset = offset;
            if buffer.len() >= self.settings.flush_rows
                || offset - last_saved >= self.settings.checkpoint_every
            {
                self.flush(&mut buffer, summary)?;
                self.store.save(state)?;
                last_saved = offset;
            }
        }
    }

    fn stop_partial(
        &self,
        account: &Account,
        offset: u64,
        reason: String,
        buffer: &mut Vec<PostRow>,
        state: &mut Checkpoint,
        summary: &mut CollectSummary,
    ) -> Result<AccountOutcome> {
        self.flush(buffer, summary)?;
        state.mark_partial(&account.handle, offset);
        self.store.save(state)?;
        Ok(AccountOutcome::Partial { offset, reason })
    }

    fn flush(&self, buffer: &mut Vec<PostRow>, summary: &mut CollectSummary) -> Result<()> {
        let written = self.sink.append(buffer)?;
        summary.rows_written += written as u64;
        buffer.clear();
        Ok(())
    }
}

/// Command-line choices for `harvest collect`.
#[derive(Debug, Clone, Default)]
pub struct CollectOptions {
    /// Resume from (or start a run bound to) this checkpoint file.
    pub checkpoint: Option<PathBuf>,
    /// Resume from the newest checkpoint in `collect.output_dir`.
    pub resume_latest: bool,
    /// Handles to collect; overrides `collect.accounts`.
    pub accounts: Vec<String>,
    /// Resolve accounts and report what would be fetched, without fetching.
    pub dry_run: bool,
}

/// Bind the run to a checkpoint: an explicit file, the newest discovered
/// one, or a fresh pair of names in `output_dir`.
///
/// Returns the store, the state, and whether the state was resumed.
pub fn open_run(
    collect: &CollectConfig,
    opts: &CollectOptions,
) -> Result<(CheckpointStore, Checkpoint, bool)> {
    if opts.checkpoint.is_some() && opts.resume_latest {
        bail!("--checkpoint and --resume-latest are mutually exclusive");
    }

    let (output_name, checkpoint_name) = run_file_names(Local::now());

    if let Some(path) = &opts.checkpoint {
        let store = CheckpointStore::new(path);
        return Ok(match store.load() {
            Some(state) => (store, state, true),
            None => (store, Checkpoint::new(output_name), false),
        });
    }

    if opts.resume_latest {
        if let Some((store, state)) = discover_latest(&collect.output_dir)? {
            return Ok((store, state, true));
        }
        info!(dir = %collect.output_dir.display(), "no checkpoint found; starting fresh");
    }

    let store = CheckpointStore::new(collect.output_dir.join(checkpoint_name));
    Ok((store, Checkpoint::new(output_name), false))
}

/// Accounts this run targets: named handles when given, otherwise every
/// account the remote lists.
pub async fn target_accounts(
    source: &dyn PostSource,
    config: &Config,
    handles: &[String],
) -> Vec<Account> {
    let handles: &[String] = if handles.is_empty() {
        &config.collect.accounts
    } else {
        handles
    };

    if !handles.is_empty() {
        return resolve_accounts(source, handles).await;
    }

    let (accounts, end) = enumerate_accounts(source, config.api.page_size).await;
    if end != PagingEnd::Exhausted {
        warn!(listed = accounts.len(), end = ?end, "account listing incomplete; collecting the accounts listed so far");
    }
    accounts
}

pub async fn run_collect(
    config: &Config,
    opts: &CollectOptions,
    reporter: &dyn ProgressReporter,
) -> Result<()> {
    let source = RestSource::new(&config.api)?;
    let (store, mut state, resumed) = open_run(&config.collect, opts)?;

    let accounts = target_accounts(&source, config, &opts.accounts).await;
    if accounts.is_empty() {
        println!("collect");
        println!("  no accounts to collect");
        println!("ok");
        return Ok(());
    }

    if opts.dry_run {
        print_dry_run(&accounts, &state, store.path(), resumed);
        return Ok(());
    }

    let output_path = output_path(&store, &state);
    let sink = if resumed {
        CsvSink::open_or_create(&output_path, &config.collect.columns)?
    } else {
        CsvSink::create(&output_path, &config.collect.columns)?
    };

    if resumed {
        info!(
            checkpoint = %store.path().display(),
            completed = state.completed_users.len(),
            partial = state.partial_users.len(),
            "resuming collection"
        );
    }

    let collector = Collector::new(
        &source,
        ContentFilter::new(config.filter.clone()),
        CollectSettings::from_config(config),
        store,
        sink,
        reporter,
    );
    let summary = collector.run(&accounts, &mut state).await?;

    print_summary(&summary, &state, collector.sink().path(), collector.store().path());
    Ok(())
}

fn output_path(store: &CheckpointStore, state: &Checkpoint) -> PathBuf {
    let name = Path::new(&state.output_file);
    if name.is_absolute() {
        name.to_path_buf()
    } else {
        store.dir().join(name)
    }
}

fn print_dry_run(accounts: &[Account], state: &Checkpoint, checkpoint: &Path, resumed: bool) {
    let mut pending = 0usize;
    let mut resuming = 0usize;
    let mut done = 0usize;
    for a in accounts {
        match state.status(&a.handle) {
            AccountStatus::Pending => pending += 1,
            AccountStatus::InProgress { .. } | AccountStatus::Partial { .. } => resuming += 1,
            AccountStatus::Completed => done += 1,
        }
    }

    println!("collect (dry-run)");
    if resumed {
        println!("  checkpoint: {}", checkpoint.display());
    }
    println!("  accounts found: {}", accounts.len());
    println!("  already completed: {}", done);
    println!("  to resume: {}", resuming);
    println!("  pending: {}", pending);
}

fn print_summary(summary: &CollectSummary, state: &Checkpoint, output: &Path, checkpoint: &Path) {
    println!("collect");
    println!("  output: {}", output.display());
    println!("  accounts: {}", summary.accounts_total);
    println!("  skipped (already completed): {}", summary.accounts_skipped);
    println!("  completed: {}", summary.accounts_completed);
    println!("  partial: {}", summary.accounts_partial);
    println!("  processed: {}", summary.processed);
    println!("  kept: {}", summary.kept);
    println!("  filtered: {}", summary.filtered);
    if summary.processed > 0 {
        println!(
            "  filtering rate: {:.1}%",
            summary.filtered as f64 * 100.0 / summary.processed as f64
        );
    }
    println!("  rows written: {}", summary.rows_written);
    if state.is_settled() {
        println!("  checkpoint: removed");
    } else {
        println!("  checkpoint: {}", checkpoint.display());
        println!(
            "  {} account(s) incomplete; rerun with --checkpoint {}",
            state.partial_users.len(),
            checkpoint.display()
        );
    }
    println!("ok");
}
