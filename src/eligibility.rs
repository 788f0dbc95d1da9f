//! Voter eligibility Merkle tree.
//!
//! The roster is a CSV of email addresses. Each normalised email hashes to
//! a leaf; leaves are padded with a zero element to a full binary tree of
//! depth `ceil(log2(n))` and the root commits to the whole roster. The
//! element type is the lowercase hex string of a SHA-256 digest; an inner
//! node hashes the concatenation of its children's hex strings. Any
//! out-of-process verifier must mirror that encoding exactly.

use crate::Error;
use indexmap::IndexMap;
use sha2::{Digest, Sha256};

/// Padding element for missing leaves.
pub const ZERO_ELEMENT: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Trim and lowercase an email address, rejecting anything without an `@`.
pub(crate) fn normalize_email(email: &str) -> Option<String> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return None;
    }
    Some(email)
}

fn leaf_hash(email: &str) -> String {
    hex::encode(Sha256::digest(email.as_bytes()))
}

fn node_hash(left: &str, right: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    hex::encode(hasher.finalize())
}

fn depth_for(n: usize) -> usize {
    if n == 0 {
        return 1;
    }
    n.next_power_of_two().trailing_zeros() as usize
}

/// A Merkle authentication path.
///
/// `path_indices[i]` is 0 when the authenticated node is the left child at
/// level `i` (sibling on the right), 1 otherwise.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MerkleProof {
    pub leaf: String,
    pub root: String,
    pub path_elements: Vec<String>,
    pub path_indices: Vec<u8>,
}

impl MerkleProof {
    /// Recompute the root from the leaf and path.
    pub fn verify(&self) -> bool {
        if self.path_elements.len() != self.path_indices.len() {
            return false;
        }
        let mut acc = self.leaf.clone();
        for (sibling, side) in self.path_elements.iter().zip(&self.path_indices) {
            acc = match side {
                0 => node_hash(&acc, sibling),
                1 => node_hash(sibling, &acc),
                _ => return false,
            };
        }
        acc == self.root
    }
}

/// Serialized tree state for export/import.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EligibilityTreeState {
    pub emails: Vec<String>,
    pub root: String,
    pub depth: usize,
}

#[derive(Clone, Debug)]
pub struct EligibilityTree {
    emails: Vec<String>,
    index: IndexMap<String, usize>,
    layers: Vec<Vec<String>>,
    depth: usize,
}

impl EligibilityTree {
    /// An empty tree of depth 1.
    pub fn new() -> Self {
        let mut tree = EligibilityTree {
            emails: Vec::new(),
            index: IndexMap::new(),
            layers: Vec::new(),
            depth: 0,
        };
        tree.rebuild();
        tree
    }

    /// Build a tree from a CSV roster.
    ///
    /// Accepts LF or CRLF line endings. If the first non-empty line contains
    /// the token `email` (case-insensitive) it is treated as a header and
    /// skipped. The first comma-separated field of each remaining line is
    /// trimmed, lowercased, and kept when it contains an `@`; duplicates
    /// keep their first occurrence.
    pub fn from_csv(csv: &str) -> Result<Self, Error> {
        let mut lines = csv.lines().map(|l| l.trim_end_matches('\r'));
        let mut emails: Vec<String> = Vec::new();

        // Header detection on the first non-empty line only.
        for line in &mut lines {
            if line.trim().is_empty() {
                continue;
            }
            if !line.to_lowercase().contains("email") {
                if let Some(email) = normalize_email(first_field(line)) {
                    emails.push(email);
                }
            }
            break;
        }
        for line in lines {
            if let Some(email) = normalize_email(first_field(line)) {
                emails.push(email);
            }
        }

        let mut tree = EligibilityTree::new();
        for email in emails {
            if !tree.index.contains_key(&email) {
                let idx = tree.emails.len();
                tree.emails.push(email.clone());
                tree.index.insert(email, idx);
            }
        }
        if tree.emails.is_empty() {
            return Err(Error::EmptyRoster);
        }
        tree.rebuild();
        Ok(tree)
    }

    fn rebuild(&mut self) {
        self.depth = depth_for(self.emails.len());
        let mut layer: Vec<String> = self.emails.iter().map(|e| leaf_hash(e)).collect();
        layer.resize(1 << self.depth, ZERO_ELEMENT.to_owned());

        let mut layers = vec![layer];
        while layers.last().unwrap().len() > 1 {
            let prev = layers.last().unwrap();
            let next: Vec<String> = prev
                .chunks(2)
                .map(|pair| node_hash(&pair[0], &pair[1]))
                .collect();
            layers.push(next);
        }
        self.layers = layers;
    }

    pub fn root(&self) -> String {
        self.layers.last().unwrap()[0].clone()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Number of unique normalised emails in the roster.
    pub fn size(&self) -> usize {
        self.emails.len()
    }

    pub fn emails(&self) -> &[String] {
        &self.emails
    }

    pub fn is_eligible(&self, email: &str) -> bool {
        match normalize_email(email) {
            Some(email) => self.index.contains_key(&email),
            None => false,
        }
    }

    /// Authentication path for `email`, or `None` for non-members.
    pub fn generate_proof(&self, email: &str) -> Option<MerkleProof> {
        let email = normalize_email(email)?;
        let mut idx = *self.index.get(&email)?;

        let mut path_elements = Vec::with_capacity(self.depth);
        let mut path_indices = Vec::with_capacity(self.depth);
        for layer in &self.layers[..self.layers.len() - 1] {
            path_elements.push(layer[idx ^ 1].clone());
            path_indices.push((idx & 1) as u8);
            idx >>= 1;
        }

        Some(MerkleProof {
            leaf: leaf_hash(&email),
            root: self.root(),
            path_elements,
            path_indices,
        })
    }

    /// Append a voter and rebuild. Fails on duplicates.
    pub fn add_voter(&mut self, email: &str) -> Result<(), Error> {
        let email =
            normalize_email(email).ok_or_else(|| Error::InvalidEmail(email.to_owned()))?;
        if self.index.contains_key(&email) {
            return Err(Error::DuplicateVoter(email));
        }
        let idx = self.emails.len();
        self.emails.push(email.clone());
        self.index.insert(email, idx);
        self.rebuild();
        Ok(())
    }

    pub fn add_voters(&mut self, emails: &[&str]) -> Result<(), Error> {
        for email in emails {
            let email =
                normalize_email(email).ok_or_else(|| Error::InvalidEmail((*email).to_owned()))?;
            if self.index.contains_key(&email) {
                return Err(Error::DuplicateVoter(email));
            }
            let idx = self.emails.len();
            self.emails.push(email.clone());
            self.index.insert(email, idx);
        }
        self.rebuild();
        Ok(())
    }

    /// Replace a roster entry in place and rebuild.
    pub fn update_voter(&mut self, old: &str, new: &str) -> Result<(), Error> {
        let old = normalize_email(old).ok_or_else(|| Error::UnknownVoter(old.to_owned()))?;
        let new = normalize_email(new).ok_or_else(|| Error::InvalidEmail(new.to_owned()))?;
        let idx = *self
            .index
            .get(&old)
            .ok_or_else(|| Error::UnknownVoter(old.clone()))?;
        if new != old && self.index.contains_key(&new) {
            return Err(Error::DuplicateVoter(new));
        }
        self.emails[idx] = new.clone();
        self.index.remove(&old);
        self.index.insert(new, idx);
        self.rebuild();
        Ok(())
    }

    pub fn export(&self) -> EligibilityTreeState {
        EligibilityTreeState {
            emails: self.emails.clone(),
            root: self.root(),
            depth: self.depth,
        }
    }

    /// Rebuild a tree from exported state, checking the recorded root.
    pub fn import(state: &EligibilityTreeState) -> Result<Self, Error> {
        let mut tree = EligibilityTree::new();
        let emails: Vec<&str> = state.emails.iter().map(|e| e.as_str()).collect();
        tree.add_voters(&emails)?;
        if tree.root() != state.root || tree.depth() != state.depth {
            return Err(Error::StateMismatch);
        }
        Ok(tree)
    }
}

impl Default for EligibilityTree {
    fn default() -> Self {
        EligibilityTree::new()
    }
}

fn first_field(line: &str) -> &str {
    line.split(',').next().unwrap_or("")
}
