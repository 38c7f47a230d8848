//! Resource instance enumeration

use crate::address::ResourceInstanceAddress;
use crate::snapshot::ResourceInstance;

/// Lazy, finite iterator over every resource instance address of a snapshot.
///
/// Yields addresses in state file order, so a single run is deterministic.
/// A clone continues from the same position; call
/// [`StateSnapshot::addresses`](crate::StateSnapshot::addresses) again to start over.
#[derive(Debug, Clone)]
pub struct ResourceEnumerator<'a> {
    entries: std::slice::Iter<'a, (ResourceInstanceAddress, ResourceInstance)>,
}

impl<'a> ResourceEnumerator<'a> {
    pub(crate) fn new(entries: &'a [(ResourceInstanceAddress, ResourceInstance)]) -> Self {
        Self {
            entries: entries.iter(),
        }
    }

    /// Pair each address with its instance
    pub fn with_instances(
        self,
    ) -> impl Iterator<Item = (&'a ResourceInstanceAddress, &'a ResourceInstance)> {
        self.entries.map(|(addr, instance)| (addr, instance))
    }
}

impl<'a> Iterator for ResourceEnumerator<'a> {
    type Item = &'a ResourceInstanceAddress;

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next().map(|(addr, _)| addr)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl ExactSizeIterator for ResourceEnumerator<'_> {}

#[cfg(test)]
mod tests {
    use crate::StateSnapshot;

    const STATE: &str = r#"{"version": 4, "resources": [
        {"mode": "managed", "type": "aws_vpc", "name": "a", "provider": "provider.aws",
         "instances": [{"attributes": {"id": "vpc-a"}}]},
        {"mode": "managed", "type": "aws_vpc", "name": "b", "provider": "provider.aws",
         "instances": [{"attributes": {"id": "vpc-b"}}]},
        {"mode": "data", "type": "aws_region", "name": "current", "provider": "provider.aws",
         "instances": [{"attributes": {"id": "eu-west-1"}}]}
    ]}"#;

    /// Enumerating twice yields the same sorted order
    #[test]
    fn test_enumeration_is_restartable_and_stable() {
        let state = StateSnapshot::from_json(STATE).unwrap();

        let first: Vec<String> = state.addresses().map(|a| a.to_string()).collect();
        let second: Vec<String> = state.addresses().map(|a| a.to_string()).collect();

        assert_eq!(first, second);
        assert_eq!(first, vec!["aws_vpc.a", "aws_vpc.b", "data.aws_region.current"]);
        assert_eq!(state.addresses().len(), 3);
    }

    /// Instances come paired with their addresses
    #[test]
    fn test_with_instances() {
        let state = StateSnapshot::from_json(STATE).unwrap();
        let ids: Vec<String> = state
            .addresses()
            .with_instances()
            .filter_map(|(_, instance)| instance.current())
            .map(|object| object.resource_id().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["vpc-a", "vpc-b", "eu-west-1"]);
    }

    /// An empty state has no addresses
    #[test]
    fn test_empty_state() {
        let state = StateSnapshot::from_json(r#"{"version": 4}"#).unwrap();
        assert!(state.is_empty());
        assert_eq!(state.addresses().count(), 0);
    }
}
