use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// One side of a friendship as seen by its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipMember {
    pub device_id: String,
    pub friend_device_id: String,
    /// The only identifier of the friend that leaves the server.
    pub friend_id: String,
}

pub trait RelationshipResolver: Send + Sync {
    fn finalized_relationships(&self, device_id: &str) -> Vec<RelationshipMember>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub device_id_1: String,
    pub device_id_2: String,
    /// Id under which device 1 knows device 2.
    pub friend_id_1: String,
    /// Id under which device 2 knows device 1.
    pub friend_id_2: String,
    #[serde(default)]
    pub finalized: bool,
}

impl Relationship {
    fn member_for(&self, device_id: &str) -> Option<RelationshipMember> {
        let (friend_device_id, friend_id) = if self.device_id_1 == device_id {
            (&self.device_id_2, &self.friend_id_1)
        } else if self.device_id_2 == device_id {
            (&self.device_id_1, &self.friend_id_2)
        } else {
            return None;
        };
        Some(RelationshipMember {
            device_id: device_id.to_string(),
            friend_device_id: friend_device_id.clone(),
            friend_id: friend_id.clone(),
        })
    }
}

#[derive(Debug, Default)]
pub struct RelationshipStore {
    relationships: Mutex<Vec<Relationship>>,
}

impl RelationshipStore {
    pub fn new(relationships: Vec<Relationship>) -> Self {
        Self {
            relationships: Mutex::new(relationships),
        }
    }

    pub fn add(&self, relationship: Relationship) {
        let mut relationships = self.relationships.lock().expect("relationships lock");
        relationships.push(relationship);
    }

}

impl RelationshipResolver for RelationshipStore {
    fn finalized_relationships(&self, device_id: &str) -> Vec<RelationshipMember> {
        let relationships = self.relationships.lock().expect("relationships lock");
        relationships
            .iter()
            .filter(|r| r.finalized)
            .filter_map(|r| r.member_for(device_id))
            .collect()
    }
}
