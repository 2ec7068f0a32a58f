use std::sync::Arc;

use regex::Regex;
use tracing::{info, instrument};

use crate::error::{DomainError, DomainResult, ErrorKind};
use crate::ledger::models::{fields, Account, Elevation, IdentityKey, RecordKind};
use crate::ledger::store::{from_document, to_document, Filter, LedgerStore, Patch};
use crate::messages;

const EMAIL_PATTERN: &str = r"^[\w.]+@\w+\.[\w.]+$";

/// Registration and maintenance of participant accounts.
///
/// Accounts are never deleted, deregistering only archives them.
pub struct AccountDirectory {
    store: Arc<dyn LedgerStore>,
    email: Regex,
}

impl AccountDirectory {
    pub fn new(store: Arc<dyn LedgerStore>) -> Result<Self, regex::Error> {
        Ok(Self {
            store: store.switch(RecordKind::Accounts),
            email: Regex::new(EMAIL_PATTERN)?,
        })
    }

    pub fn is_valid_email(&self, email: &str) -> bool {
        self.email.is_match(email)
    }

    fn active(tid: IdentityKey) -> Filter {
        Filter::new()
            .eq(fields::IDENTITY, tid)
            .eq(fields::ARCHIVED, false)
    }

    async fn count(&self, filter: &Filter, location: &'static str) -> DomainResult<u64> {
        self.store
            .count(filter)
            .await
            .map_err(|e| DomainError::store(location, e, "checking the account"))
    }

    async fn fetch(&self, filter: &Filter, location: &'static str) -> DomainResult<Option<Account>> {
        let doc = self
            .store
            .get_one(filter)
            .await
            .map_err(|e| DomainError::store(location, e, "getting the account"))?;
        doc.map(from_document::<Account>)
            .transpose()
            .map_err(|e| DomainError::store(location, e, "reading the account"))
    }

    async fn require_active(&self, tid: IdentityKey, location: &'static str) -> DomainResult<Account> {
        self.fetch(&Self::active(tid), location).await?.ok_or_else(|| {
            DomainError::new(ErrorKind::AccountNotFound, location)
                .with_field("tid", tid)
                .with_user_message(messages::account_not_found(tid))
        })
    }

    fn invalid_email(location: &'static str, tid: IdentityKey, email: &str) -> DomainError {
        DomainError::new(ErrorKind::InvalidField, location)
            .with_field("tid", tid)
            .with_field("email", email)
            .with_user_message(messages::invalid_field("the email does not look right"))
    }

    // ========== REGISTRATION ==========

    /// New accounts start as participants.
    ///
    /// An archived account with the same key is reactivated with the new
    /// email and reported as `ReactivatedExisting`.
    #[instrument(skip(self))]
    pub async fn register(&self, tid: IdentityKey, email: &str, name: &str) -> DomainResult<Account> {
        const LOC: &str = "Register";

        if !self.is_valid_email(email) {
            return Err(Self::invalid_email(LOC, tid, email));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::new(ErrorKind::InvalidField, LOC)
                .with_field("tid", tid)
                .with_user_message(messages::invalid_field("a display name is required")));
        }

        let same_key = self.count(&Self::active(tid), LOC).await?;
        let same_email = self
            .count(
                &Filter::new()
                    .eq(fields::EMAIL, email)
                    .eq(fields::ARCHIVED, false),
                LOC,
            )
            .await?;
        if same_key > 0 || same_email > 0 {
            return Err(DomainError::new(ErrorKind::DuplicateAccount, LOC)
                .with_field("tid", tid)
                .with_field("email", email)
                .with_user_message(messages::duplicate_account(tid, email)));
        }

        let archived = Filter::new()
            .eq(fields::IDENTITY, tid)
            .eq(fields::ARCHIVED, true);
        if self.count(&archived, LOC).await? > 0 {
            let patch = Patch::new()
                .set(fields::ARCHIVED, false)
                .set(fields::EMAIL, email)
                .set(fields::NAME, name);
            self.store
                .update_one(&archived, &patch)
                .await
                .map_err(|e| DomainError::store(LOC, e, "reactivating the account"))?;
            return Err(DomainError::new(ErrorKind::ReactivatedExisting, LOC)
                .with_field("tid", tid)
                .with_user_message(messages::account_reactivated(tid)));
        }

        let account = Account::new(tid, email, name);
        let doc = to_document(&account)
            .map_err(|e| DomainError::store(LOC, e, "registering the account"))?;
        self.store
            .add_one(doc)
            .await
            .map_err(|e| DomainError::store(LOC, e, "registering the account"))?;

        info!(tid, "✓ Account registered");
        Ok(account)
    }

    // ========== MAINTENANCE ==========

    /// Sets the elevation of an active account; `level` outside the closed range is rejected
    #[instrument(skip(self))]
    pub async fn elevate(&self, tid: IdentityKey, level: u8) -> DomainResult<Account> {
        const LOC: &str = "Elevate";

        self.require_active(tid, LOC).await?;
        let elevation = Elevation::try_from(level).map_err(|reason| {
            DomainError::new(ErrorKind::InvalidField, LOC)
                .with_field("tid", tid)
                .with_field("reason", reason)
                .with_user_message(messages::elevation_ceiling())
        })?;

        self.store
            .update_one(
                &Self::active(tid),
                &Patch::new().set(fields::ELEVATION, u8::from(elevation)),
            )
            .await
            .map_err(|e| DomainError::store(LOC, e, "elevating the account"))?;

        info!(tid, elevation = %elevation, "✓ Account elevated");
        self.require_active(tid, LOC).await
    }

    #[instrument(skip(self))]
    pub async fn update_email(&self, tid: IdentityKey, email: &str) -> DomainResult<Account> {
        const LOC: &str = "UpdateEmail";

        self.require_active(tid, LOC).await?;
        if !self.is_valid_email(email) {
            return Err(Self::invalid_email(LOC, tid, email));
        }
        let taken = Filter::new()
            .eq(fields::EMAIL, email)
            .eq(fields::ARCHIVED, false);
        if let Some(other) = self.fetch(&taken, LOC).await? {
            if other.tid != tid {
                return Err(DomainError::new(ErrorKind::DuplicateAccount, LOC)
                    .with_field("tid", tid)
                    .with_field("email", email)
                    .with_user_message(messages::duplicate_account(other.tid, email)));
            }
        }

        self.store
            .update_one(&Self::active(tid), &Patch::new().set(fields::EMAIL, email))
            .await
            .map_err(|e| DomainError::store(LOC, e, "updating the email"))?;

        self.require_active(tid, LOC).await
    }

    #[instrument(skip(self))]
    pub async fn deregister(&self, tid: IdentityKey) -> DomainResult<()> {
        const LOC: &str = "Deregister";

        self.require_active(tid, LOC).await?;
        self.store
            .update_one(&Self::active(tid), &Patch::new().set(fields::ARCHIVED, true))
            .await
            .map_err(|e| DomainError::store(LOC, e, "archiving the account"))?;

        info!(tid, "✓ Account archived");
        Ok(())
    }

    pub async fn lookup(&self, tid: IdentityKey) -> DomainResult<Account> {
        self.require_active(tid, "Lookup").await
    }
}
