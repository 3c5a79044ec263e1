//! Placement Scheduler - round-robin ownership of particles.
//!
//! One `Placement` exists per orchestration run. The node list is the
//! registry snapshot taken when the run starts and is never refreshed,
//! even if nodes join or leave while the run is executing.

use qios_env::ConnId;
use std::collections::HashMap;

/// A declared resource and the node that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Particle {
    pub name: String,
    pub owner: ConnId,
}

/// Per-run placement table.
#[derive(Debug, Clone, Default)]
pub struct Placement {
    /// Snapshot of registered nodes at run start
    nodes: Vec<ConnId>,

    /// Particles in first-declaration order
    particles: Vec<Particle>,

    /// name -> index into `particles`
    index: HashMap<String, usize>,

    /// Declarations placed so far; drives the round-robin
    declared: usize,
}

impl Placement {
    pub fn new(nodes: Vec<ConnId>) -> Self {
        Self {
            nodes,
            ..Self::default()
        }
    }

    /// Places a declaration on the next node in round-robin order.
    ///
    /// Re-declaring a name overwrites its owner. Returns `None` when the
    /// snapshot holds no nodes.
    pub fn place(&mut self, name: &str) -> Option<ConnId> {
        if self.nodes.is_empty() {
            return None;
        }
        let owner = self.nodes[self.declared % self.nodes.len()];
        self.declared += 1;

        match self.index.get(name) {
            Some(&i) => self.particles[i].owner = owner,
            None => {
                self.index.insert(name.to_string(), self.particles.len());
                self.particles.push(Particle {
                    name: name.to_string(),
                    owner,
                });
            }
        }
        Some(owner)
    }

    /// Owner of a declared particle, `None` if undeclared.
    pub fn owner_of(&self, name: &str) -> Option<ConnId> {
        self.index.get(name).map(|&i| self.particles[i].owner)
    }

    /// Owners of both operands, only if both resolve.
    pub fn owner_pair(&self, a: &str, b: &str) -> Option<(ConnId, ConnId)> {
        Some((self.owner_of(a)?, self.owner_of(b)?))
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn nodes(&self) -> &[ConnId] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }
}
