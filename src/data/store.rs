use std::ops::Deref;

use bson::doc;
use mongodb::options::IndexOptions;
use mongodb::{Client, ClientSession, Database, IndexModel};

use crate::resp::error::ApiError;

/// Handle to the backing database. Derefs to [`Database`] so the
/// per-collection extension traits read naturally; multi-document mutations
/// additionally need the [`Client`] to open transaction sessions.
#[derive(Debug, Clone)]
pub struct Store {
    client: Client,
    db: Database,
}

impl Store {
    pub fn new(client: Client, db_name: &str) -> Store {
        let db = client.database(db_name);
        Store { client, db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Opens a session with a started transaction. Callers must commit; the
    /// driver aborts the transaction when the session drops uncommitted.
    pub async fn transaction(&self) -> Result<ClientSession, ApiError> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;
        Ok(session)
    }

    /// Unique indexes backing the application-level invariants: one account
    /// per username/email, one enrollment per (user, course, role), one
    /// like/save per (user, project).
    pub async fn ensure_indexes(&self) -> Result<(), mongodb::error::Error> {
        use crate::data::enrollment::ENROLLMENT_COLLECTION_NAME;
        use crate::data::project::{LIKE_COLLECTION_NAME, SAVED_COLLECTION_NAME};
        use crate::data::user::USER_COLLECTION_NAME;

        fn unique(keys: bson::Document) -> IndexModel {
            IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().unique(true).build())
                .build()
        }

        let users = self.db.collection::<bson::Document>(USER_COLLECTION_NAME);
        users.create_index(unique(doc! { "username": 1 }), None).await?;
        users.create_index(unique(doc! { "email": 1 }), None).await?;

        self.db
            .collection::<bson::Document>(ENROLLMENT_COLLECTION_NAME)
            .create_index(unique(doc! { "user": 1, "course": 1, "role": 1 }), None)
            .await?;

        for name in [LIKE_COLLECTION_NAME, SAVED_COLLECTION_NAME] {
            self.db
                .collection::<bson::Document>(name)
                .create_index(unique(doc! { "project": 1, "user": 1 }), None)
                .await?;
        }

        Ok(())
    }
}

impl Deref for Store {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}
