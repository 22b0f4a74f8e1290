use std::path::Path;

use redb::{
    Database,
    ReadableDatabase,
    ReadableTable,
    ReadableTableMetadata,
    TableDefinition,
};

use crate::{
    condenser::Condenser,
    error::{Error, Result},
    signature::Signature,
    store::{
        DocumentRecord,
        SignatureStore,
        decode_signature,
        missing_document,
    },
};

const DOCUMENTS: TableDefinition<&str, &str> =
    TableDefinition::new("documents");
const SIGNATURES: TableDefinition<&str, &[u8]> =
    TableDefinition::new("signatures");
const SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("settings");

/// Settings key holding the condenser spec all signatures were built with.
pub const CONDENSER_SPEC: &str = "condenser_spec";

/// Document records, their signatures and store-wide settings in a single
/// redb file.
///
/// Records are stored as JSON, signatures as big-endian `u32` values.
pub struct DocumentDb {
    db: Database,
}

impl DocumentDb {
    /// Open or create a document database at the given path.
    ///
    /// # Examples
    ///
    /// ```
    /// # let tmp = tempfile::tempdir().unwrap();
    /// use neardup::DocumentDb;
    ///
    /// let db = DocumentDb::open(&tmp.path().join("documents.redb")).unwrap();
    /// assert!(db.list_documents().unwrap().is_empty());
    /// ```
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        // Ensure all tables exist by opening them in a write transaction.
        let txn = db.begin_write()?;
        txn.open_table(DOCUMENTS)?;
        txn.open_table(SIGNATURES)?;
        txn.open_table(SETTINGS)?;
        txn.commit()?;

        Ok(Self { db })
    }

    // -- Documents --

    pub fn find_document(&self, id: &str) -> Result<Option<DocumentRecord>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DOCUMENTS)?;
        match table.get(id)? {
            Some(v) => Ok(Some(serde_json::from_str(v.value())?)),
            None => Ok(None),
        }
    }

    /// Remove a record together with its signature.
    pub fn remove_document(&self, id: &str) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut documents = txn.open_table(DOCUMENTS)?;
            let mut signatures = txn.open_table(SIGNATURES)?;
            signatures.remove(id)?;
            documents.remove(id)?.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    /// All records, ordered by id, in a single read transaction.
    pub fn list_documents(&self) -> Result<Vec<DocumentRecord>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DOCUMENTS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (_k, v) = entry?;
            result.push(serde_json::from_str(v.value())?);
        }
        Ok(result)
    }

    // -- Signatures --

    pub fn signature_count(&self) -> Result<u64> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SIGNATURES)?;
        Ok(table.len()?)
    }

    /// Drop every stored signature and forget the condenser they were
    /// built with, so that the next run may choose a new one. Returns the
    /// number of signatures dropped.
    pub fn clear_signatures(&self) -> Result<u64> {
        let txn = self.db.begin_write()?;
        let dropped = txn.open_table(SIGNATURES)?.len()?;
        txn.delete_table(SIGNATURES)?;
        txn.open_table(SIGNATURES)?;
        txn.open_table(SETTINGS)?.remove(CONDENSER_SPEC)?;
        txn.commit()?;
        Ok(dropped)
    }

    // -- Settings --

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SETTINGS)?;
            table.insert(key, value)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        Ok(table.get(key)?.map(|v| v.value().to_string()))
    }

    /// The condenser this database's signatures are built with.
    ///
    /// The first call records the requested spec (or the default one).
    /// Later calls return the recorded condenser and reject a requested
    /// spec that differs from it, since signatures built with different
    /// condensers cannot be compared.
    pub fn condenser(&self, requested: Option<&str>) -> Result<Condenser> {
        let requested = requested.map(Condenser::from_spec).transpose()?;

        match self.get_setting(CONDENSER_SPEC)? {
            Some(stored) => {
                let condenser = Condenser::from_spec(&stored)?;
                if let Some(requested) = requested
                    && requested.to_spec() != condenser.to_spec()
                {
                    return Err(Error::Config(format!(
                        "database signatures use '{}', refusing '{}'",
                        condenser.to_spec(),
                        requested.to_spec()
                    )));
                }
                Ok(condenser)
            }
            None => {
                let condenser = requested.unwrap_or_default();
                self.set_setting(CONDENSER_SPEC, &condenser.to_spec())?;
                tracing::info!(spec = %condenser, "Recorded condenser spec");
                Ok(condenser)
            }
        }
    }
}

impl SignatureStore for DocumentDb {
    fn get_signature(&self, id: &str) -> Result<Option<Signature>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SIGNATURES)?;
        table
            .get(id)?
            .map(|v| decode_signature(id, v.value()))
            .transpose()
    }

    fn put_signature(&self, id: &str, signature: &Signature) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SIGNATURES)?;
            table.insert(id, signature.to_bytes().as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    fn put_signatures(&self, entries: &[(String, Signature)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SIGNATURES)?;
            for (id, signature) in entries {
                table.insert(id.as_str(), signature.to_bytes().as_slice())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    fn get_document(&self, id: &str) -> Result<DocumentRecord> {
        self.find_document(id)?
            .ok_or_else(|| missing_document(id))
    }

    fn put_document(&self, record: &DocumentRecord) -> Result<()> {
        self.put_documents(std::slice::from_ref(record))
    }

    /// Insert or replace multiple records in a single transaction.
    fn put_documents(&self, records: &[DocumentRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(DOCUMENTS)?;
            for record in records {
                let json = serde_json::to_string(record)?;
                table.insert(record.id.as_str(), json.as_str())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    fn remove_signature(&self, id: &str) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(SIGNATURES)?;
            table.remove(id)?.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }
}

impl std::fmt::Debug for DocumentDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentDb").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::record;

    fn test_db() -> (tempfile::TempDir, DocumentDb) {
        let tmp = tempfile::tempdir().unwrap();
        let db = DocumentDb::open(&tmp.path().join("documents.redb")).unwrap();
        (tmp, db)
    }

    #[test]
    fn documents_crud() {
        let (_tmp, db) = test_db();

        assert!(db.list_documents().unwrap().is_empty());
        assert_eq!(db.find_document("a").unwrap(), None);
        assert!(matches!(
            db.get_document("a"),
            Err(Error::NotFound { kind: "document", .. })
        ));

        db.put_document(&record("b", None)).unwrap();
        db.put_documents(&[record("a", Some("privileged")), record("c", None)])
            .unwrap();
        assert_eq!(db.list_documents().unwrap().len(), 3);
        assert_eq!(db.get_document("a").unwrap(), record("a", Some("privileged")));

        let ids: Vec<_> =
            db.list_documents().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, ["a", "b", "c"]);

        assert!(db.remove_document("b").unwrap());
        assert!(!db.remove_document("b").unwrap());
        assert_eq!(db.list_documents().unwrap().len(), 2);
    }

    #[test]
    fn signatures_crud() {
        let (_tmp, db) = test_db();
        let sig = Signature::from_values(vec![7, u32::MAX, 0]);

        assert_eq!(db.get_signature("a").unwrap(), None);
        db.put_signature("a", &sig).unwrap();
        assert_eq!(db.get_signature("a").unwrap(), Some(sig.clone()));

        let newer = Signature::from_values(vec![1, 2, 3]);
        db.put_signatures(&[
            ("a".to_string(), newer.clone()),
            ("b".to_string(), sig.clone()),
        ])
        .unwrap();
        assert_eq!(db.get_signature("a").unwrap(), Some(newer));
        assert_eq!(db.signature_count().unwrap(), 2);

        assert!(db.remove_signature("b").unwrap());
        assert!(!db.remove_signature("b").unwrap());

        assert_eq!(db.clear_signatures().unwrap(), 1);
        assert_eq!(db.signature_count().unwrap(), 0);
    }

    #[test]
    fn removing_document_removes_signature() {
        let (_tmp, db) = test_db();
        db.put_document(&record("a", None)).unwrap();
        db.put_signature("a", &Signature::from_values(vec![1])).unwrap();

        db.remove_document("a").unwrap();
        assert_eq!(db.get_signature("a").unwrap(), None);
    }

    #[test]
    fn corrupt_signature_is_reported() {
        let (_tmp, db) = test_db();
        let txn = db.db.begin_write().unwrap();
        {
            let mut table = txn.open_table(SIGNATURES).unwrap();
            table.insert("bad", [1u8, 2, 3].as_slice()).unwrap();
        }
        txn.commit().unwrap();

        assert!(matches!(
            db.get_signature("bad"),
            Err(Error::CorruptSignature { len: 3, .. })
        ));
    }

    #[test]
    fn condenser_spec_is_recorded_and_enforced() {
        let (_tmp, db) = test_db();

        let first = db.condenser(Some("3-grams:norm::64")).unwrap();
        assert_eq!(first.to_spec(), "3-grams:norm:sha1:64");
        assert_eq!(
            db.get_setting(CONDENSER_SPEC).unwrap(),
            Some("3-grams:norm:sha1:64".to_string())
        );

        // Equivalent spelling of the same spec is accepted.
        assert_eq!(
            db.condenser(Some("3-grams:norm:sha1:64")).unwrap().to_spec(),
            first.to_spec()
        );
        assert_eq!(db.condenser(None).unwrap().to_spec(), first.to_spec());
        assert!(matches!(
            db.condenser(Some("ws:::")),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn clearing_signatures_releases_condenser() {
        let (_tmp, db) = test_db();
        db.condenser(Some("3-grams:norm::64")).unwrap();
        db.put_signature("a", &Signature::from_values(vec![1; 64]))
            .unwrap();
        assert!(db.condenser(Some("ws:::")).is_err());

        assert_eq!(db.clear_signatures().unwrap(), 1);
        assert_eq!(db.get_setting(CONDENSER_SPEC).unwrap(), None);
        assert_eq!(
            db.condenser(Some("ws:::")).unwrap().to_spec(),
            "ws:norm-html:sha1:128"
        );
    }

    #[test]
    fn default_condenser_recorded() {
        let (_tmp, db) = test_db();
        assert_eq!(
            db.condenser(None).unwrap().to_spec(),
            "ws:norm-html:sha1:128"
        );
    }

    #[test]
    fn reopen_preserves_data() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("documents.redb");

        {
            let db = DocumentDb::open(&path).unwrap();
            db.put_document(&record("a", None)).unwrap();
            db.put_signature("a", &Signature::from_values(vec![9, 9]))
                .unwrap();
            db.set_setting("version", "1").unwrap();
        }

        {
            let db = DocumentDb::open(&path).unwrap();
            assert_eq!(db.get_document("a").unwrap(), record("a", None));
            assert_eq!(
                db.get_signature("a").unwrap(),
                Some(Signature::from_values(vec![9, 9]))
            );
            assert_eq!(
                db.get_setting("version").unwrap(),
                Some("1".to_string())
            );
        }
    }
}
