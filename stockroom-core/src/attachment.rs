use std::fmt::{self, Debug, Display, Formatter};

use crate::record::Attachment;

/// An incoming file from the API layer.
#[derive(Clone, PartialEq)]
pub struct Upload {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Upload {
            name: name.into(),
            bytes,
        }
    }
}

impl Debug for Upload {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upload")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// The blob work an update has to perform, computed once from the request.
#[derive(Debug, Clone, PartialEq)]
pub enum AttachmentOp {
    None,
    Replace(Upload),
    ReplaceAndDeleteOld { upload: Upload, old_name: String },
    DeleteOnly(String),
}

impl AttachmentOp {
    /// Combine an optional new file with the caller's "existing name to delete" hint.
    /// A blank hint counts as absent.
    pub fn resolve(file: Option<Upload>, delete_hint: Option<String>) -> Self {
        let delete_hint = delete_hint
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());

        match (file, delete_hint) {
            (None, None) => AttachmentOp::None,
            (Some(upload), None) => AttachmentOp::Replace(upload),
            (Some(upload), Some(old_name)) => AttachmentOp::ReplaceAndDeleteOld { upload, old_name },
            (None, Some(old_name)) => AttachmentOp::DeleteOnly(old_name),
        }
    }

    /// Bind the request to the record's current attachment.
    ///
    /// Uploads always get a fresh blob, so any replacement also removes the
    /// current one. A delete hint must name the current attachment; a hint on
    /// a record without an attachment has nothing left to delete.
    pub fn against(self, current: Option<&Attachment>) -> Result<Self, AttachmentMismatch> {
        match (self, current) {
            (AttachmentOp::Replace(upload), Some(current))
            | (AttachmentOp::ReplaceAndDeleteOld { upload, .. }, Some(current)) => {
                Ok(AttachmentOp::ReplaceAndDeleteOld {
                    upload,
                    old_name: current.filename.clone(),
                })
            }
            (AttachmentOp::ReplaceAndDeleteOld { upload, .. }, None) => {
                Ok(AttachmentOp::Replace(upload))
            }
            (AttachmentOp::DeleteOnly(old_name), Some(current)) if old_name != current.filename => {
                Err(AttachmentMismatch {
                    requested: old_name,
                    current: current.filename.clone(),
                })
            }
            (AttachmentOp::DeleteOnly(_), None) => Ok(AttachmentOp::None),
            (op, _) => Ok(op),
        }
    }

    pub fn blob_to_delete(&self) -> Option<&str> {
        match self {
            AttachmentOp::ReplaceAndDeleteOld { old_name, .. } => Some(old_name),
            AttachmentOp::DeleteOnly(old_name) => Some(old_name),
            AttachmentOp::None | AttachmentOp::Replace(_) => None,
        }
    }

    pub fn upload(&self) -> Option<&Upload> {
        match self {
            AttachmentOp::Replace(upload) => Some(upload),
            AttachmentOp::ReplaceAndDeleteOld { upload, .. } => Some(upload),
            AttachmentOp::None | AttachmentOp::DeleteOnly(_) => None,
        }
    }
}

/// A delete hint that names a file the record does not hold.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentMismatch {
    pub requested: String,
    pub current: String,
}

impl Display for AttachmentMismatch {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cannot delete attachment '{}', the record holds '{}'",
            self.requested, self.current
        )
    }
}
