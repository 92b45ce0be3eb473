//! Oracle guidance parsing
//!
//! The decision oracle returns free text with no guaranteed structure. This
//! module decodes it defensively into a closed, role-specific action
//! enumeration plus an optional 1-based item index, with out-of-range
//! indices remapped into the valid range (or 0 when there are no
//! candidates). Unparsed text never propagates as a live action value.

use rand::Rng;

/// Actions available to a browsing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitorAction {
    Read,
    FollowLink,
    Comment,
    GoHome,
    End,
}

impl VisitorAction {
    /// Default when the guidance carries no recognizable action marker.
    pub const DEFAULT: Self = VisitorAction::Read;

    fn from_marker(n: u32) -> Option<Self> {
        match n {
            1 => Some(VisitorAction::Read),
            2 => Some(VisitorAction::FollowLink),
            3 => Some(VisitorAction::Comment),
            4 => Some(VisitorAction::GoHome),
            5 => Some(VisitorAction::End),
            _ => None,
        }
    }
}

/// Actions available to an administration session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminAction {
    Approve,
    Reject,
    Reply,
    CreatePost,
    End,
}

impl AdminAction {
    /// Default when the guidance carries no recognizable action marker.
    /// Approve without a usable pending comment is skipped by the session,
    /// so this degrades to a no-op cycle on fully malformed guidance.
    pub const DEFAULT: Self = AdminAction::Approve;

    fn from_marker(n: u32) -> Option<Self> {
        match n {
            1 => Some(AdminAction::Approve),
            2 => Some(AdminAction::Reject),
            3 => Some(AdminAction::Reply),
            4 => Some(AdminAction::CreatePost),
            5 => Some(AdminAction::End),
            _ => None,
        }
    }
}

/// One parsed oracle consultation: a bounded action and a remapped item
/// index (1-based; 0 means not applicable). The free-text rationale is
/// discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision<A> {
    pub action: A,
    pub item: usize,
}

/// Raw markers found in guidance text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Guidance {
    pub action: Option<u32>,
    pub item: Option<i64>,
}

/// Scan guidance text for `ACTION:` and `LINK_NUMBER:`/`ITEM_NUMBER:`
/// markers. The first digit 1-5 appearing in the action value wins; an item
/// marker whose value does not parse counts as 1.
pub fn parse_guidance(text: &str) -> Guidance {
    let mut guidance = Guidance::default();

    for line in text.lines() {
        if let Some((_, value)) = line.split_once("ACTION:") {
            for n in 1..=5u32 {
                let digit = char::from_digit(n, 10).unwrap();
                if value.contains(digit) {
                    guidance.action = Some(n);
                    break;
                }
            }
        }
        let item_value = line
            .split_once("LINK_NUMBER:")
            .or_else(|| line.split_once("ITEM_NUMBER:"))
            .map(|(_, v)| v);
        if let Some(value) = item_value {
            guidance.item = Some(value.trim().parse().unwrap_or(1));
        }
    }

    guidance
}

/// Decode a visitor decision. An out-of-range link index falls back to the
/// first candidate; 0 when there are no candidates.
pub fn decide_visitor(text: &str, candidate_count: usize) -> Decision<VisitorAction> {
    let guidance = parse_guidance(text);
    let action = guidance
        .action
        .and_then(VisitorAction::from_marker)
        .unwrap_or(VisitorAction::DEFAULT);

    let item = if candidate_count == 0 {
        0
    } else {
        match guidance.item {
            Some(n) if n >= 1 && n <= candidate_count as i64 => n as usize,
            _ => 1,
        }
    };

    Decision { action, item }
}

/// Decode an administrator decision. An out-of-range item index is remapped
/// uniformly into the pending range; 0 when the pending list is empty.
pub fn decide_admin(
    text: &str,
    pending_count: usize,
    rng: &mut impl Rng,
) -> Decision<AdminAction> {
    let guidance = parse_guidance(text);
    let action = guidance
        .action
        .and_then(AdminAction::from_marker)
        .unwrap_or(AdminAction::DEFAULT);

    let item = if pending_count == 0 {
        0
    } else {
        match guidance.item {
            Some(n) if n >= 1 && n <= pending_count as i64 => n as usize,
            _ => rng.gen_range(1..=pending_count),
        }
    };

    Decision { action, item }
}
