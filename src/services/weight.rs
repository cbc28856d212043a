// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Weight progress history of the signed-in user.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::db::{ChangeEvent, Gateway, Table};
use crate::error::{AppError, Result};
use crate::models::{Identity, NewWeightEntry, WeightDraft, WeightEntry};
use crate::services::auth::{concerns_signed_in_user, AuthSnapshot};

/// Weight entry CRUD with reload-after-write.
pub struct WeightService {
    gateway: Arc<dyn Gateway>,
    auth: watch::Receiver<AuthSnapshot>,
    /// Entries of the current user, newest date first
    entries: watch::Sender<Vec<WeightEntry>>,
}

impl WeightService {
    pub fn new(gateway: Arc<dyn Gateway>, auth: watch::Receiver<AuthSnapshot>) -> Self {
        let (entries, _) = watch::channel(Vec::new());
        Self {
            gateway,
            auth,
            entries,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<WeightEntry>> {
        self.entries.subscribe()
    }

    pub fn entries(&self) -> Vec<WeightEntry> {
        self.entries.borrow().clone()
    }

    fn require_identity(&self) -> Result<Identity> {
        self.auth
            .borrow()
            .identity
            .clone()
            .ok_or_else(|| AppError::Auth("Not signed in".to_string()))
    }

    /// Reload the list; a failed read shows an empty history.
    pub async fn load(&self) {
        let identity = self.auth.borrow().identity.clone();
        let entries = match identity {
            None => Vec::new(),
            Some(identity) => match self.gateway.list_weight_entries(&identity.id).await {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::error!(user_id = %identity.id, error = %e, detail = ?e.detail(), "Failed to load weight entries");
                    Vec::new()
                }
            },
        };
        self.entries.send_replace(entries);
    }

    /// Reload on pushed weight rows of the current user and whenever the
    /// signed-in identity changes.
    pub fn spawn_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let changes = self.gateway.subscribe(Table::WeightProgress);
        let mut auth = self.auth.clone();
        // Taken now so a sign-in before the task first runs still counts.
        let owner = auth.borrow_and_update().identity.as_ref().map(|i| i.id.clone());
        let service = Arc::clone(self);
        tokio::spawn(async move { service.follow(changes, auth, owner).await })
    }

    async fn follow(
        &self,
        mut changes: broadcast::Receiver<ChangeEvent>,
        mut auth: watch::Receiver<AuthSnapshot>,
        mut owner: Option<String>,
    ) {
        loop {
            let reload = tokio::select! {
                event = changes.recv() => match event {
                    Ok(event) => concerns_signed_in_user(&self.auth, &event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Weight listener lagged, reloading");
                        true
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                changed = auth.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    // Profile edits do not touch the weight history.
                    let current = auth.borrow_and_update().identity.as_ref().map(|i| i.id.clone());
                    let switched = current != owner;
                    owner = current;
                    switched
                }
            };
            if reload {
                self.load().await;
            }
        }
        tracing::debug!("Weight listener stopped");
    }

    pub async fn add(&self, draft: WeightDraft) -> Result<WeightEntry> {
        let draft = draft.checked()?;
        let identity = self.require_identity()?;
        let entry = self
            .gateway
            .create_weight_entry(&NewWeightEntry {
                owner_id: identity.id.clone(),
                draft,
            })
            .await?;
        tracing::info!(user_id = %identity.id, entry_id = %entry.id, weight = entry.weight, "Added weight entry");
        self.load().await;
        Ok(entry)
    }

    pub async fn update(&self, entry_id: &str, draft: WeightDraft) -> Result<WeightEntry> {
        let draft = draft.checked()?;
        self.require_identity()?;
        let entry = self.gateway.update_weight_entry(entry_id, &draft).await?;
        tracing::info!(entry_id, weight = entry.weight, "Updated weight entry");
        self.load().await;
        Ok(entry)
    }

    pub async fn delete(&self, entry_id: &str) -> Result<()> {
        self.require_identity()?;
        self.gateway.delete_weight_entry(entry_id).await?;
        tracing::info!(entry_id, "Deleted weight entry");
        self.load().await;
        Ok(())
    }
}
