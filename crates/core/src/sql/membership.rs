use std::collections::{BTreeSet, HashMap};

use crate::filter::JoinType;
use crate::model::{CourseId, GroupId, GroupingId};
use crate::sql::{CompiledPredicate, ParamMap, SqlParam, in_or_equal};

/// Group filter value meaning "learners in no group of the course".
pub const NO_GROUP: i64 = -1;

/// One entry of a group membership filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GroupSelector {
    Group(GroupId),
    NoGroup,
}

impl GroupSelector {
    /// Decodes a raw filter value; `-1` is the "no group" sentinel.
    #[must_use]
    pub fn from_raw(value: i64) -> Option<Self> {
        match value {
            NO_GROUP => Some(Self::NoGroup),
            v => u64::try_from(v).ok().map(|id| Self::Group(GroupId::new(id))),
        }
    }
}

/// Columns and scope a membership join is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct MembershipScope<'a> {
    pub course_id: CourseId,
    pub user_column: &'a str,
}

/// Builds the joins and predicate selecting users by group membership.
///
/// `prefix` must be unique per call; it namespaces both the table aliases and
/// the parameter names. Returns `None` when there is nothing to select on.
#[must_use]
pub fn membership_join(
    selectors: &[GroupSelector],
    semantics: JoinType,
    scope: MembershipScope<'_>,
    prefix: &str,
) -> Option<CompiledPredicate> {
    let group_ids: Vec<i64> = selectors
        .iter()
        .filter_map(|s| match s {
            GroupSelector::Group(id) => i64::try_from(id.value()).ok(),
            GroupSelector::NoGroup => None,
        })
        .collect();
    let no_group = selectors.contains(&GroupSelector::NoGroup);
    if group_ids.is_empty() && !no_group {
        return None;
    }

    let user = scope.user_column;
    let mut joins = Vec::new();
    let mut wheres = Vec::new();
    let mut params = ParamMap::new();

    if no_group {
        let course_param = format!("{prefix}courseid");
        joins.push(format!(
            "LEFT JOIN (SELECT DISTINCT ngm.userid FROM groups_members ngm \
             JOIN course_groups ng ON ng.id = ngm.groupid WHERE ng.courseid = :{course_param}) \
             {prefix}ng ON {prefix}ng.userid = {user}"
        ));
        params.insert(course_param, SqlParam::id(scope.course_id.value()));
        let in_course_group = semantics == JoinType::None;
        wheres.push(if in_course_group {
            format!("{prefix}ng.userid IS NOT NULL")
        } else {
            format!("{prefix}ng.userid IS NULL")
        });
    }

    match semantics {
        JoinType::All => {
            for (i, id) in group_ids.iter().enumerate() {
                let param = format!("{prefix}g{i}");
                joins.push(format!(
                    "LEFT JOIN groups_members {prefix}gm{i} \
                     ON ({prefix}gm{i}.userid = {user} AND {prefix}gm{i}.groupid = :{param})"
                ));
                wheres.push(format!("{prefix}gm{i}.userid IS NOT NULL"));
                params.insert(param, SqlParam::Int(*id));
            }
        }
        JoinType::Any | JoinType::None if !group_ids.is_empty() => {
            let (in_sql, in_params) = in_or_equal(&group_ids, &format!("{prefix}g"), true);
            joins.push(format!(
                "LEFT JOIN groups_members {prefix}gm \
                 ON ({prefix}gm.userid = {user} AND {prefix}gm.groupid {in_sql})"
            ));
            wheres.push(if semantics == JoinType::Any {
                format!("{prefix}gm.userid IS NOT NULL")
            } else {
                format!("{prefix}gm.userid IS NULL")
            });
            params.extend(in_params);
        }
        JoinType::Any | JoinType::None => {}
    }

    let joiner = if semantics == JoinType::Any {
        " OR "
    } else {
        " AND "
    };
    Some(CompiledPredicate::new(joins, wheres.join(joiner), params))
}

//
// ─── GROUPING RESOLUTION ───────────────────────────────────────────────────────
//

/// Resolves groupings to the union of their member groups within one course.
pub trait GroupingResolver {
    fn group_ids(&self, groupings: &[GroupingId]) -> BTreeSet<GroupId>;
}

/// Grouping membership of a course, loaded up front so that compilation stays
/// free of I/O.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupingIndex {
    members: HashMap<GroupingId, BTreeSet<GroupId>>,
}

impl GroupingIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the index from `(grouping, group)` pairs.
    #[must_use]
    pub fn from_pairs(pairs: impl IntoIterator<Item = (GroupingId, GroupId)>) -> Self {
        let mut index = Self::new();
        for (grouping, group) in pairs {
            index.insert(grouping, group);
        }
        index
    }

    pub fn insert(&mut self, grouping: GroupingId, group: GroupId) {
        self.members.entry(grouping).or_default().insert(group);
    }

    /// Registers a grouping without any member groups.
    pub fn insert_empty(&mut self, grouping: GroupingId) {
        self.members.entry(grouping).or_default();
    }
}

impl GroupingResolver for GroupingIndex {
    fn group_ids(&self, groupings: &[GroupingId]) -> BTreeSet<GroupId> {
        groupings
            .iter()
            .filter_map(|g| self.members.get(g))
            .flat_map(|groups| groups.iter().copied())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> MembershipScope<'static> {
        MembershipScope {
            course_id: CourseId::new(2),
            user_column: "u.id",
        }
    }

    fn groups(ids: &[u64]) -> Vec<GroupSelector> {
        ids.iter()
            .map(|id| GroupSelector::Group(GroupId::new(*id)))
            .collect()
    }

    #[test]
    fn sentinel_decodes_to_no_group() {
        assert_eq!(GroupSelector::from_raw(-1), Some(GroupSelector::NoGroup));
        assert_eq!(
            GroupSelector::from_raw(4),
            Some(GroupSelector::Group(GroupId::new(4)))
        );
        assert_eq!(GroupSelector::from_raw(-7), None);
    }

    #[test]
    fn all_joins_once_per_group() {
        let pred = membership_join(&groups(&[10, 20]), JoinType::All, scope(), "p0_").unwrap();
        assert_eq!(pred.joins.len(), 2);
        assert!(pred.joins[1].contains("p0_gm1.groupid = :p0_g1"));
        assert_eq!(
            pred.wheres,
            "p0_gm0.userid IS NOT NULL AND p0_gm1.userid IS NOT NULL"
        );
        assert_eq!(pred.params["p0_g0"], SqlParam::Int(10));
        assert_eq!(pred.params["p0_g1"], SqlParam::Int(20));
    }

    #[test]
    fn any_uses_a_single_in_list_join() {
        let pred = membership_join(&groups(&[10, 20]), JoinType::Any, scope(), "p1_").unwrap();
        assert_eq!(pred.joins.len(), 1);
        assert!(pred.joins[0].contains("p1_gm.groupid IN (:p1_g0, :p1_g1)"));
        assert_eq!(pred.wheres, "p1_gm.userid IS NOT NULL");
    }

    #[test]
    fn none_requires_absent_membership() {
        let pred = membership_join(&groups(&[10]), JoinType::None, scope(), "p2_").unwrap();
        assert!(pred.joins[0].contains("p2_gm.groupid = :p2_g0"));
        assert_eq!(pred.wheres, "p2_gm.userid IS NULL");
    }

    #[test]
    fn no_group_with_any_is_or_combined() {
        let mut selectors = groups(&[10]);
        selectors.push(GroupSelector::NoGroup);
        let pred = membership_join(&selectors, JoinType::Any, scope(), "p3_").unwrap();
        assert_eq!(
            pred.wheres,
            "p3_ng.userid IS NULL OR p3_gm.userid IS NOT NULL"
        );
        assert_eq!(pred.params["p3_courseid"], SqlParam::Int(2));
    }

    #[test]
    fn no_group_alone_with_none_selects_grouped_users() {
        let pred =
            membership_join(&[GroupSelector::NoGroup], JoinType::None, scope(), "p4_").unwrap();
        assert_eq!(pred.wheres, "p4_ng.userid IS NOT NULL");
        assert_eq!(pred.joins.len(), 1);
    }

    #[test]
    fn empty_selection_is_inactive() {
        assert!(membership_join(&[], JoinType::All, scope(), "p5_").is_none());
    }

    #[test]
    fn grouping_index_unions_member_groups() {
        let mut index = GroupingIndex::from_pairs([
            (GroupingId::new(1), GroupId::new(10)),
            (GroupingId::new(1), GroupId::new(20)),
            (GroupingId::new(2), GroupId::new(20)),
            (GroupingId::new(2), GroupId::new(30)),
        ]);
        index.insert_empty(GroupingId::new(3));

        let ids = index.group_ids(&[GroupingId::new(1), GroupingId::new(2)]);
        assert_eq!(
            ids.into_iter().collect::<Vec<_>>(),
            vec![GroupId::new(10), GroupId::new(20), GroupId::new(30)]
        );
        assert!(index.group_ids(&[GroupingId::new(3)]).is_empty());
        assert!(index.group_ids(&[GroupingId::new(99)]).is_empty());
    }
}
