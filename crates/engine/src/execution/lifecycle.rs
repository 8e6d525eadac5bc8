//! The network interaction lifecycle.
//!
//! One driver instance owns one interaction from request to resolution:
//! broadcast, confirmation polling, fee bumping, drop and user-replacement
//! handling, timeout. The driver never mutates state directly; it journals
//! messages and re-reads the projection, so an interrupted run resumes from
//! whatever the journal last recorded.

use std::time::Instant;

use alloy_core::primitives::B256;

use crate::error::{CallError, EngineError};
use crate::journal::JournalMessage;
use crate::module::FutureId;
use crate::provider::{BlockTag, CallRequest, TransactionRequest, TxFees};
use crate::state::{
    ConfirmedTransaction, NetworkInteraction, OnchainInteraction, TransactionAttempt,
};

use super::ExecutionContext;

/// How an onchain interaction resolved.
pub(crate) enum OnchainOutcome {
    /// A transaction confirmed at the required depth. The receipt may still
    /// carry a revert status; interpreting it is the caller's business.
    Confirmed(ConfirmedTransaction),
    /// Fee-bump allowance exhausted; the owning future is timed out.
    TimedOut,
}

/// How a static call resolved.
pub(crate) enum StaticOutcome {
    Ok(alloy_core::primitives::Bytes),
    Reverted(String),
}

pub(crate) struct InteractionDriver<'a> {
    ctx: &'a ExecutionContext,
    future_id: FutureId,
    interaction_id: u64,
}

impl<'a> InteractionDriver<'a> {
    pub(crate) fn new(ctx: &'a ExecutionContext, future_id: FutureId, interaction_id: u64) -> Self {
        Self {
            ctx,
            future_id,
            interaction_id,
        }
    }

    async fn snapshot(&self) -> Result<OnchainInteraction, EngineError> {
        let state = self.ctx.writer.state().await;
        let interaction = state
            .get(&self.future_id)
            .and_then(|exec| exec.interaction(self.interaction_id))
            .and_then(NetworkInteraction::as_onchain)
            .cloned();
        interaction.ok_or_else(|| {
            // Only reachable through a bug: the runner requests the
            // interaction before driving it.
            EngineError::Journal(crate::error::JournalError::Corrupt {
                line: 0,
                reason: format!(
                    "onchain interaction {} of {} missing from projection",
                    self.interaction_id, self.future_id
                ),
            })
        })
    }

    /// Drive an onchain interaction to confirmation or timeout.
    pub(crate) async fn drive_onchain(&self) -> Result<OnchainOutcome, EngineError> {
        loop {
            let onchain = self.snapshot().await?;
            if let Some(confirmed) = onchain.confirmed {
                return Ok(OnchainOutcome::Confirmed(confirmed));
            }

            match self.drive_round(onchain).await? {
                RoundOutcome::Resolved(outcome) => return Ok(outcome),
                // Dropped transaction: restart with a fresh nonce and
                // transaction.
                RoundOutcome::Restart => continue,
            }
        }
    }

    async fn drive_round(
        &self,
        mut onchain: OnchainInteraction,
    ) -> Result<RoundOutcome, EngineError> {
        if onchain.attempts.is_empty() {
            let nonce = match onchain.nonce {
                Some(nonce) => nonce,
                None => self.ctx.nonce.reserve(onchain.from).await?,
            };
            let fees = self.ctx.provider.fee_estimate().await?;
            self.send_attempt(&mut onchain, nonce, fees).await?;
        }

        let mut last_send = Instant::now();
        loop {
            tokio::time::sleep(self.ctx.config.block_polling_interval()).await;

            if let Some(confirmed) = self.check_confirmation(&onchain).await? {
                self.ctx
                    .writer
                    .apply(JournalMessage::TransactionConfirm {
                        future_id: self.future_id.clone(),
                        interaction_id: self.interaction_id,
                        hash: confirmed.hash,
                        receipt: confirmed.receipt.clone(),
                    })
                    .await?;
                tracing::info!(
                    future = %self.future_id,
                    hash = %confirmed.hash,
                    "Transaction confirmed"
                );
                return Ok(RoundOutcome::Resolved(OnchainOutcome::Confirmed(confirmed)));
            }

            if !self.any_attempt_known(&onchain).await? {
                let nonce = onchain.nonce.unwrap_or_default();
                let mined_count = self
                    .ctx
                    .provider
                    .get_transaction_count(onchain.from, BlockTag::Latest)
                    .await?;

                if mined_count > nonce {
                    // The nonce was consumed by a transaction that is not
                    // ours: the user replaced it. Track the replacement.
                    if onchain.replaced_by.is_none() {
                        if let Some(hash) = self
                            .ctx
                            .provider
                            .find_transaction_by_nonce(onchain.from, nonce)
                            .await?
                        {
                            tracing::warn!(
                                future = %self.future_id,
                                replacement = %hash,
                                "Transaction replaced by user, tracking replacement"
                            );
                            self.ctx
                                .writer
                                .apply(JournalMessage::OnchainInteractionReplacedByUser {
                                    future_id: self.future_id.clone(),
                                    interaction_id: self.interaction_id,
                                    hash,
                                })
                                .await?;
                            onchain.replaced_by = Some(hash);
                        }
                    }
                    continue;
                }

                // Nonce unconsumed and every attempt evicted: the
                // transaction was dropped. Start over.
                tracing::warn!(
                    future = %self.future_id,
                    "Transaction dropped from the mempool, restarting interaction"
                );
                self.ctx
                    .writer
                    .apply(JournalMessage::OnchainInteractionDropped {
                        future_id: self.future_id.clone(),
                        interaction_id: self.interaction_id,
                    })
                    .await?;
                self.ctx.nonce.release(onchain.from, nonce).await;
                return Ok(RoundOutcome::Restart);
            }

            if last_send.elapsed() >= self.ctx.config.fee_bump_interval() {
                let bumps_used = onchain.attempts.len().saturating_sub(1) as u32;
                if self.ctx.config.disable_fee_bumping
                    || bumps_used >= self.ctx.config.max_fee_bumps
                {
                    tracing::warn!(
                        future = %self.future_id,
                        attempts = onchain.attempts.len(),
                        "Fee-bump allowance exhausted, timing out"
                    );
                    self.ctx
                        .writer
                        .apply(JournalMessage::OnchainInteractionTimeout {
                            future_id: self.future_id.clone(),
                            interaction_id: self.interaction_id,
                        })
                        .await?;
                    return Ok(RoundOutcome::Resolved(OnchainOutcome::TimedOut));
                }

                self.ctx
                    .writer
                    .apply(JournalMessage::OnchainInteractionBumpFees {
                        future_id: self.future_id.clone(),
                        interaction_id: self.interaction_id,
                    })
                    .await?;
                // Attempts are non-empty here: an empty interaction is sent
                // before the poll loop starts.
                let previous = match onchain.attempts.last() {
                    Some(attempt) => attempt.fees,
                    None => continue,
                };
                let suggested = self.ctx.provider.fee_estimate().await?;
                let fees = TxFees::bumped_from(&previous, &suggested);
                let nonce = onchain.nonce.unwrap_or_default();
                self.send_attempt(&mut onchain, nonce, fees).await?;
                last_send = Instant::now();
            }
        }
    }

    async fn send_attempt(
        &self,
        onchain: &mut OnchainInteraction,
        nonce: u64,
        fees: TxFees,
    ) -> Result<(), EngineError> {
        let request = TransactionRequest {
            from: onchain.from,
            to: onchain.to,
            data: onchain.data.clone(),
            value: onchain.value,
            nonce,
            fees,
        };
        let hash = self.ctx.provider.send_transaction(&request).await?;
        tracing::info!(
            future = %self.future_id,
            %hash,
            nonce,
            attempt = onchain.attempts.len() + 1,
            "Transaction sent"
        );
        let attempt = TransactionAttempt { hash, fees };
        self.ctx
            .writer
            .apply(JournalMessage::TransactionSend {
                future_id: self.future_id.clone(),
                interaction_id: self.interaction_id,
                nonce,
                attempt: attempt.clone(),
            })
            .await?;
        onchain.nonce = Some(nonce);
        onchain.attempts.push(attempt);
        Ok(())
    }

    /// Look for a receipt at the required depth for any of our attempts or
    /// the user replacement, newest first.
    async fn check_confirmation(
        &self,
        onchain: &OnchainInteraction,
    ) -> Result<Option<ConfirmedTransaction>, EngineError> {
        let head = self.ctx.provider.block_number().await?;
        for hash in self.candidate_hashes(onchain) {
            let Some(receipt) = self.ctx.provider.get_transaction_receipt(hash).await? else {
                continue;
            };
            let depth = head.saturating_sub(receipt.block_number) + 1;
            if depth >= self.ctx.config.required_confirmations {
                return Ok(Some(ConfirmedTransaction { hash, receipt }));
            }
            tracing::trace!(
                future = %self.future_id,
                %hash,
                depth,
                required = self.ctx.config.required_confirmations,
                "Transaction mined, awaiting confirmation depth"
            );
        }
        Ok(None)
    }

    fn candidate_hashes(&self, onchain: &OnchainInteraction) -> Vec<B256> {
        let mut hashes: Vec<B256> = onchain.replaced_by.into_iter().collect();
        hashes.extend(onchain.attempts.iter().rev().map(|a| a.hash));
        hashes
    }

    async fn any_attempt_known(&self, onchain: &OnchainInteraction) -> Result<bool, EngineError> {
        for hash in self.candidate_hashes(onchain) {
            if self.ctx.provider.get_transaction(hash).await?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Drive a static call: one request, no retry.
    pub(crate) async fn drive_static(
        &self,
        request: CallRequest,
    ) -> Result<StaticOutcome, EngineError> {
        // Resume case: the call already resolved in a previous run.
        let state = self.ctx.writer.state().await;
        if let Some(NetworkInteraction::StaticCall(call)) = state
            .get(&self.future_id)
            .and_then(|exec| exec.interaction(self.interaction_id))
        {
            if let Some(result) = &call.result {
                return Ok(StaticOutcome::Ok(result.clone()));
            }
        }

        match self.ctx.provider.call(&request).await {
            Ok(result) => {
                self.ctx
                    .writer
                    .apply(JournalMessage::StaticCallComplete {
                        future_id: self.future_id.clone(),
                        interaction_id: self.interaction_id,
                        result: result.clone(),
                    })
                    .await?;
                Ok(StaticOutcome::Ok(result))
            }
            Err(CallError::Reverted { reason }) => Ok(StaticOutcome::Reverted(reason)),
            Err(CallError::Provider(e)) => Err(EngineError::Provider(e)),
        }
    }
}

enum RoundOutcome {
    Resolved(OnchainOutcome),
    Restart,
}
