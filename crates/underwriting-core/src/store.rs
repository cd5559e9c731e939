use crate::error::UnderwritingError;
use crate::schema::{Document, NewDocument, UnderwritingResult};
use hashbrown::HashMap;
use parking_lot::RwLock;
use uuid::Uuid;

/// Process-local state: users, their documents, and the latest result per user.
///
/// Nothing here survives a restart.
#[derive(Debug, Default)]
pub struct Store {
    users: RwLock<HashMap<String, Vec<String>>>, // user_id -> document ids, insertion order
    documents: RwLock<HashMap<String, Document>>,
    results: RwLock<HashMap<String, UnderwritingResult>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_user(&self, user_id: &str) -> Result<(), UnderwritingError> {
        if user_id.trim().is_empty() {
            return Err(UnderwritingError::InvalidInput("user_id must not be empty".into()));
        }
        let mut users = self.users.write();
        if users.contains_key(user_id) {
            return Err(UnderwritingError::UserExists {
                user_id: user_id.to_string(),
            });
        }
        users.insert(user_id.to_string(), Vec::new());
        Ok(())
    }

    pub fn user_exists(&self, user_id: &str) -> bool {
        self.users.read().contains_key(user_id)
    }

    /// Attach a document to an existing user; returns the stored document.
    pub fn add_document(&self, user_id: &str, doc: NewDocument) -> Result<Document, UnderwritingError> {
        let document_id = match doc.document_id {
            Some(id) if !id.trim().is_empty() => id,
            _ => Uuid::new_v4().to_string(),
        };
        let stored = Document {
            document_id: document_id.clone(),
            user_id: user_id.to_string(),
            name: doc.name,
            content: doc.content,
        };

        // users -> documents 固定加锁顺序
        let mut users = self.users.write();
        let ids = users
            .get_mut(user_id)
            .ok_or_else(|| UnderwritingError::UserNotFound {
                user_id: user_id.to_string(),
            })?;
        let mut docs = self.documents.write();
        if let Some(prev) = docs.get(&document_id) {
            if prev.user_id != user_id {
                return Err(UnderwritingError::InvalidInput(format!(
                    "document_id {document_id} belongs to another user"
                )));
            }
        } else {
            ids.push(document_id.clone());
        }
        docs.insert(document_id, stored.clone());
        Ok(stored)
    }

    /// `None` for an unknown user; ids whose document is missing are skipped.
    pub fn user_documents(&self, user_id: &str) -> Option<Vec<Document>> {
        let users = self.users.read();
        let ids = users.get(user_id)?;
        let docs = self.documents.read();
        Some(ids.iter().filter_map(|id| docs.get(id).cloned()).collect())
    }

    pub fn put_result(&self, user_id: &str, result: UnderwritingResult) {
        self.results.write().insert(user_id.to_string(), result);
    }

    pub fn result(&self, user_id: &str) -> Option<UnderwritingResult> {
        self.results.read().get(user_id).cloned()
    }

    pub fn users_total(&self) -> usize {
        self.users.read().len()
    }
}
