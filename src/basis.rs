use std::collections::HashMap;
use md5::{Digest, Md5};
use crate::records::Requirement;

/// Legal basis shared by a group of requirements.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BasisKey {
    pub name: String,
    pub locator: String,
    pub url: String,
}

impl BasisKey {
    pub fn of(r: &Requirement) -> BasisKey {
        BasisKey { name: r.basis_name.clone(), locator: r.basis_locator.clone(), url: r.basis_url.clone() }
    }

    /// First 10 hex chars of md5("name||locator||url"). Existing page names depend on this exact form.
    pub fn hash_key(&self) -> String {
        let s = format!("{}||{}||{}", self.name, self.locator, self.url);
        let digest = Md5::digest(s.as_bytes());
        let mut h = hex::encode(digest);
        h.truncate(10);
        h
    }

    pub fn display(&self) -> String { format!("{} / {}", self.name, self.locator) }
}

pub fn page_file_name(event_id: &str, hash: &str) -> String { format!("{}__{}.html", event_id, hash) }

/// Groups in order of first appearance; records keep input order within a group.
pub fn group_by_basis(records: Vec<Requirement>) -> Vec<(BasisKey, Vec<Requirement>)> {
    let mut index: HashMap<BasisKey, usize> = HashMap::new();
    let mut groups: Vec<(BasisKey, Vec<Requirement>)> = Vec::new();
    for r in records {
        let key = BasisKey::of(&r);
        match index.get(&key) {
            Some(&i) => groups[i].1.push(r),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![r]));
            }
        }
    }
    groups
}
