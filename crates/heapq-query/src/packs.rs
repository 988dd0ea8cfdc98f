//! Built-in named queries.

use crate::error::QueryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryPack {
    pub name: &'static str,
    pub description: &'static str,
    pub query: &'static str,
}

pub const QUERY_PACKS: &[QueryPack] = &[
    QueryPack {
        name: "types",
        description: "every type in the snapshot with its field and static counts",
        query: "allClasses().select(c => { name: typeOf(c).name, \
                fields: typeOf(c).fieldCount, statics: typeOf(c).staticCount })",
    },
    QueryPack {
        name: "histogram",
        description: "live objects per type, most frequent first",
        query: "allObjects().groupBy(o => typeOf(o).name)\
                .select(g => { type: g.key, count: g.items.count() })\
                .orderByDescending(r => r.count)",
    },
    QueryPack {
        name: "statics",
        description: "static field values of every type that declares any",
        query: "allClasses().where(c => typeOf(c).staticCount > 0)",
    },
];

pub fn query_pack(name: &str) -> Result<&'static QueryPack, QueryError> {
    QUERY_PACKS
        .iter()
        .find(|pack| pack.name == name)
        .ok_or_else(|| QueryError::UnknownPack(name.to_string()))
}

pub fn pack_names() -> Vec<&'static str> {
    QUERY_PACKS.iter().map(|pack| pack.name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::wrap_query;
    use crate::lang::lexer::lex;
    use crate::lang::parser::parse_unit;
    use crate::lang::resolve;

    #[test]
    fn every_pack_compiles() {
        for pack in QUERY_PACKS {
            let source = wrap_query(pack.query);
            let (tokens, lex_errors) = lex(&source);
            assert!(lex_errors.is_empty(), "{} does not lex", pack.name);
            let unit = parse_unit(&tokens)
                .unwrap_or_else(|d| panic!("{}: {}", pack.name, d.message));
            assert!(resolve(&unit.body).is_empty(), "{} does not resolve", pack.name);
        }
    }

    #[test]
    fn unknown_pack_lists_known_names() {
        let err = query_pack("nope").expect_err("unknown");
        assert_eq!(
            err.to_string(),
            "unknown query pack \"nope\" (known packs: types, histogram, statics)"
        );
        assert_eq!(query_pack("histogram").map(|p| p.name).ok(), Some("histogram"));
    }
}
