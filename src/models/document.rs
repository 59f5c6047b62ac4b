use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::category::Category;
use super::DocumentError;
use crate::crypto::PublicKey;
use crate::store::ContentHash;

static ADDRESS_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").unwrap());

/// Ledger account address (`0x` + 40 hex digits), normalised to lower case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountAddress(String);

impl AccountAddress {
    pub fn parse(raw: &str) -> Result<Self, DocumentError> {
        let trimmed = raw.trim();
        if !ADDRESS_PATTERN.is_match(trimmed) {
            return Err(DocumentError::InvalidAddress(raw.to_string()));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AccountAddress {
    type Error = DocumentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AccountAddress> for String {
    fn from(value: AccountAddress) -> Self {
        value.0
    }
}

impl std::fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Patients, doctors, hospitals, clinics and labs share one address space.
pub type PatientAddress = AccountAddress;

/// Opaque ciphertext (base64) of a content hash sealed for the patient.
///
/// Carries no identity beyond its position in a list; two pointers to the
/// same hash never compare equal because sealing is randomised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EncryptedPointer(String);

impl EncryptedPointer {
    pub fn new(ciphertext: impl Into<String>) -> Self {
        Self(ciphertext.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for EncryptedPointer {
    type Error = DocumentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Err(DocumentError::MalformedDocument("empty encrypted pointer".into()));
        }
        Ok(Self(value))
    }
}

impl From<EncryptedPointer> for String {
    fn from(value: EncryptedPointer) -> Self {
        value.0
    }
}

/// Descriptive fields captured at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientProfile {
    pub address: PatientAddress,
    pub name: String,
    pub date_of_birth: String,
    pub blood_group: String,
    pub phone_number: String,
}

/// A patient's record document: identity fields plus four append-only
/// lists of encrypted pointers.
///
/// Fields are private; the only way to change a document is
/// `append_pointer`, which consumes the value and returns the next one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDocument {
    patient_address: PatientAddress,
    name: String,
    #[serde(rename = "dob")]
    date_of_birth: String,
    phone_number: String,
    blood_group: String,
    public_key: String,
    timestamp: i64,
    #[serde(rename = "vaccinationHash")]
    vaccination: Vec<EncryptedPointer>,
    #[serde(rename = "acuteHash")]
    acute: Vec<EncryptedPointer>,
    #[serde(rename = "chronicHash")]
    chronic: Vec<EncryptedPointer>,
    #[serde(rename = "accidentHash")]
    accident: Vec<EncryptedPointer>,
}

impl RecordDocument {
    /// New document at registration: all four lists empty.
    pub fn empty(profile: PatientProfile, public_key: &PublicKey, timestamp: i64) -> Self {
        Self {
            patient_address: profile.address,
            name: profile.name,
            date_of_birth: profile.date_of_birth,
            phone_number: profile.phone_number,
            blood_group: profile.blood_group,
            public_key: public_key.to_pem(),
            timestamp,
            vaccination: Vec::new(),
            acute: Vec::new(),
            chronic: Vec::new(),
            accident: Vec::new(),
        }
    }

    /// Append `pointer` to the end of `category`'s list. Every other field is untouched.
    pub fn append_pointer(mut self, category: Category, pointer: EncryptedPointer) -> Self {
        self.list_mut(category).push(pointer);
        self
    }

    /// Same as `append_pointer`, for an untyped tag. Unknown tags are `InvalidCategory`.
    pub fn append_pointer_tagged(self, tag: &str, pointer: EncryptedPointer) -> Result<Self, DocumentError> {
        let category: Category = tag.parse()?;
        Ok(self.append_pointer(category, pointer))
    }

    /// Canonical byte form: pretty-printed JSON with two-space indent.
    pub fn serialize(&self) -> Result<Vec<u8>, DocumentError> {
        serde_json::to_vec_pretty(self).map_err(|e| DocumentError::Serialization(e.to_string()))
    }

    /// Strict parse: missing fields and wrongly typed list elements are rejected.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, DocumentError> {
        serde_json::from_slice(bytes).map_err(|e| DocumentError::MalformedDocument(e.to_string()))
    }

    pub fn pointers(&self, category: Category) -> &[EncryptedPointer] {
        match category {
            Category::Vaccination => &self.vaccination,
            Category::Accident => &self.accident,
            Category::Chronic => &self.chronic,
            Category::Acute => &self.acute,
        }
    }

    fn list_mut(&mut self, category: Category) -> &mut Vec<EncryptedPointer> {
        match category {
            Category::Vaccination => &mut self.vaccination,
            Category::Accident => &mut self.accident,
            Category::Chronic => &mut self.chronic,
            Category::Acute => &mut self.acute,
        }
    }

    /// Total pointers across all categories.
    pub fn pointer_count(&self) -> usize {
        Category::ALL.iter().map(|c| self.pointers(*c).len()).sum()
    }

    pub fn patient_address(&self) -> &PatientAddress {
        &self.patient_address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn date_of_birth(&self) -> &str {
        &self.date_of_birth
    }

    pub fn blood_group(&self) -> &str {
        &self.blood_group
    }

    pub fn phone_number(&self) -> &str {
        &self.phone_number
    }

    /// Armored public key text, exactly as stored.
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

/// Metadata for one uploaded clinical file. This object, not the raw file,
/// is what gets uploaded and whose hash is sealed into a category list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecordMetadata {
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(rename = "originalfileName")]
    pub original_file_name: String,
    #[serde(rename = "dateOfUpload")]
    pub upload_timestamp: i64,
    #[serde(rename = "fileIpfsHash")]
    pub file_hash: ContentHash,
    #[serde(rename = "doctorAddress")]
    pub uploader_address: AccountAddress,
}

impl FileRecordMetadata {
    pub fn deserialize(bytes: &[u8]) -> Result<Self, DocumentError> {
        serde_json::from_slice(bytes).map_err(|e| DocumentError::MalformedDocument(e.to_string()))
    }
}
