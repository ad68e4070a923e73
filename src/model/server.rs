use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, PickFirst, serde_as};

use super::{SpaceId, SpaceOrder};

/// Reply to a status request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub current: CurrentSpace,
    pub spaces: Vec<SpaceStatus>,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentSpace {
    /// Live value of the preference.
    pub enabled: bool,
    /// Order of the current space, when one is known.
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub space: Option<SpaceOrder>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<SpaceId>,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceStatus {
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub id: SpaceId,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<SpaceOrder>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    pub description: String,
    pub enabled: bool,
}

/// Reply to a toggle or set request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnabledReply {
    pub enabled: bool,
}

/// Orders by ascending order, unordered spaces last, ties by id.
pub fn sort_spaces(spaces: &mut [SpaceStatus]) {
    spaces.sort_by(|a, b| match (a.order, b.order) {
        (Some(x), Some(y)) => x.cmp(&y).then(a.id.cmp(&b.id)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.id.cmp(&b.id),
    });
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn entry(id: u64, order: Option<SpaceOrder>) -> SpaceStatus {
        SpaceStatus {
            id: SpaceId::new(id),
            order,
            uuid: None,
            description: format!("Space {id}"),
            enabled: false,
        }
    }

    #[test]
    fn unordered_spaces_sort_last() {
        let mut spaces =
            vec![entry(30, Some(3)), entry(10, Some(1)), entry(99, None), entry(20, Some(2))];
        sort_spaces(&mut spaces);
        let orders: Vec<_> = spaces.iter().map(|s| s.order).collect();
        assert_eq!(orders, vec![Some(1), Some(2), Some(3), None]);
    }

    #[test]
    fn ties_break_by_id() {
        let mut spaces = vec![entry(8, None), entry(2, None), entry(5, Some(1)), entry(4, Some(1))];
        sort_spaces(&mut spaces);
        let ids: Vec<u64> = spaces.iter().map(|s| s.id.get()).collect();
        assert_eq!(ids, vec![4, 5, 2, 8]);
    }

    #[test]
    fn status_serializes_with_wire_shape() {
        let status = StatusSnapshot {
            current: CurrentSpace { enabled: true, space: Some(2), id: Some(SpaceId::new(77)) },
            spaces: vec![SpaceStatus {
                id: SpaceId::new(77),
                order: Some(2),
                uuid: Some("U".into()),
                description: "Desktop 2 (U)".into(),
                enabled: true,
            }],
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(
            value,
            json!({
                "current": { "enabled": true, "space": 2, "id": 77 },
                "spaces": [{
                    "id": 77,
                    "order": 2,
                    "uuid": "U",
                    "description": "Desktop 2 (U)",
                    "enabled": true,
                }],
            })
        );
    }

    #[test]
    fn numeric_fields_accept_strings() {
        let value = json!({
            "current": { "enabled": false, "space": "3" },
            "spaces": [
                { "id": "12345678901", "order": "3", "description": "Desktop 3", "enabled": false },
                { "id": 5, "description": "Space 5", "enabled": true },
            ],
        });
        let status: StatusSnapshot = serde_json::from_value(value).unwrap();
        assert_eq!(status.current.space, Some(3));
        assert_eq!(status.current.id, None);
        assert_eq!(status.spaces[0].id, SpaceId::new(12345678901));
        assert_eq!(status.spaces[0].order, Some(3));
        assert_eq!(status.spaces[1].order, None);
        assert_eq!(status.spaces[1].uuid, None);
    }
}
