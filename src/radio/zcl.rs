//! Little-endian ZCL payload decoding for the commands the
//! Synchronizer consumes (spec §6 "Wire formats"). Byte-level parsing
//! only; semantic reaction lives in `sync.rs`.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMembershipResponse {
    pub capacity: u8,
    pub count: u8,
    pub groups: Vec<u16>,
}

pub fn parse_group_membership_response(buf: &[u8]) -> Option<GroupMembershipResponse> {
    if buf.len() < 2 {
        return None;
    }
    let capacity = buf[0];
    let count = buf[1];
    let mut groups = Vec::with_capacity(count as usize);
    let mut offset = 2;
    for _ in 0..count {
        let bytes: [u8; 2] = buf.get(offset..offset + 2)?.try_into().ok()?;
        groups.push(u16::from_le_bytes(bytes));
        offset += 2;
    }
    Some(GroupMembershipResponse {
        capacity,
        count,
        groups,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddOrRemoveGroupResponse {
    pub status: u8,
    pub group_id: u16,
}

pub fn parse_add_or_remove_group_response(buf: &[u8]) -> Option<AddOrRemoveGroupResponse> {
    if buf.len() < 3 {
        return None;
    }
    Some(AddOrRemoveGroupResponse {
        status: buf[0],
        group_id: u16::from_le_bytes(buf[1..3].try_into().ok()?),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneMembershipResponse {
    pub status: u8,
    pub capacity: u8,
    pub group: u16,
    pub count: u8,
    pub scenes: Vec<u8>,
}

pub fn parse_scene_membership_response(buf: &[u8]) -> Option<SceneMembershipResponse> {
    if buf.len() < 5 {
        return None;
    }
    let status = buf[0];
    let capacity = buf[1];
    let group = u16::from_le_bytes(buf[2..4].try_into().ok()?);
    let count = buf[4];
    let scenes = buf.get(5..5 + count as usize)?.to_vec();
    Some(SceneMembershipResponse {
        status,
        capacity,
        group,
        count,
        scenes,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneStatusResponse {
    pub status: u8,
    pub group: u16,
    pub scene: u8,
}

pub fn parse_scene_status_response(buf: &[u8]) -> Option<SceneStatusResponse> {
    if buf.len() < 4 {
        return None;
    }
    Some(SceneStatusResponse {
        status: buf[0],
        group: u16::from_le_bytes(buf[1..3].try_into().ok()?),
        scene: buf[3],
    })
}

/// 0x0006/0x0008/0x0300 extension-set fields pulled out of a
/// `ViewScene` response.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ViewSceneExtensions {
    pub on: Option<bool>,
    pub level: Option<u8>,
    pub x: Option<u16>,
    pub y: Option<u16>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewSceneResponse {
    pub status: u8,
    pub group: u16,
    pub scene: u8,
    /// 1/10s units.
    pub transition_time: u16,
    pub extensions: ViewSceneExtensions,
}

pub fn parse_view_scene_response(buf: &[u8]) -> Option<ViewSceneResponse> {
    if buf.len() < 7 {
        return None;
    }
    let status = buf[0];
    let group = u16::from_le_bytes(buf[1..3].try_into().ok()?);
    let scene = buf[3];
    if status != 0 {
        return Some(ViewSceneResponse {
            status,
            group,
            scene,
            transition_time: 0,
            extensions: ViewSceneExtensions::default(),
        });
    }
    let transition_time = u16::from_le_bytes(buf[4..6].try_into().ok()?);
    let mut extensions = ViewSceneExtensions::default();
    let mut offset = 6;
    while offset + 3 <= buf.len() {
        let cluster = u16::from_le_bytes(buf[offset..offset + 2].try_into().ok()?);
        let len = buf[offset + 2] as usize;
        let data = buf.get(offset + 3..offset + 3 + len)?;
        match cluster {
            0x0006 if !data.is_empty() => extensions.on = Some(data[0] != 0),
            0x0008 if !data.is_empty() => extensions.level = Some(data[0]),
            0x0300 if data.len() >= 4 => {
                extensions.x = Some(u16::from_le_bytes(data[0..2].try_into().ok()?));
                extensions.y = Some(u16::from_le_bytes(data[2..4].try_into().ok()?));
            }
            _ => {}
        }
        offset += 3 + len;
    }
    Some(ViewSceneResponse {
        status,
        group,
        scene,
        transition_time,
        extensions,
    })
}

/// `lux = 10^((z-1)/10000)`, computed as the spec's stated
/// approximation `pow(10, z/10000) - 1`. `0` and `0xFFFF` are invalid
/// sentinels (spec §4.4).
#[must_use]
pub fn decode_illuminance(z: u16) -> Option<f64> {
    if z == 0 || z == 0xFFFF {
        return None;
    }
    Some(10f64.powf(f64::from(z) / 10000.0) - 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_membership_round_trip() {
        let buf = [10u8, 2, 0x03, 0x00, 0x04, 0x00];
        let parsed = parse_group_membership_response(&buf).unwrap();
        assert_eq!(parsed.capacity, 10);
        assert_eq!(parsed.count, 2);
        assert_eq!(parsed.groups, vec![3, 4]);
    }

    #[test]
    fn illuminance_sentinels_are_invalid() {
        assert_eq!(decode_illuminance(0), None);
        assert_eq!(decode_illuminance(0xFFFF), None);
        assert!(decode_illuminance(1).is_some());
    }

    #[test]
    fn illuminance_decodes_expected_range() {
        let lux = decode_illuminance(40000).unwrap();
        assert!((lux - 9999.0).abs() < 10.0);
    }

    #[test]
    fn view_scene_parses_onoff_and_level_extensions() {
        let mut buf = vec![0u8, 3, 0, 10, 5, 0];
        buf.extend_from_slice(&[0x06, 0x00, 1, 1]);
        buf.extend_from_slice(&[0x08, 0x00, 1, 128]);
        let parsed = parse_view_scene_response(&buf).unwrap();
        assert_eq!(parsed.extensions.on, Some(true));
        assert_eq!(parsed.extensions.level, Some(128));
    }
}
