//! Select statments into pg_* tables and corresponding return types
use sql_db_meta_core::*;


pub const GET_SCHEMAS: &str = "SELECT nspname AS name
FROM pg_namespace
WHERE nspname NOT IN ('pg_catalog', 'information_schema', 'pg_toast')
	AND nspname NOT LIKE 'pg\\_temp\\_%'
	AND nspname NOT LIKE 'pg\\_toast\\_temp\\_%'
ORDER BY nspname ASC";
#[derive(Debug, TryFromRow)]
pub struct GetSchemas {
	pub name: String,
}

/// Base and partitioned tables, views and materialized views of one schema
pub const GET_RELATIONS: &str = "SELECT c.oid,
	c.relname AS name,
	c.relkind IN ('v', 'm') AS is_view,
	obj_description(c.oid, 'pg_class') AS comment
FROM pg_class c
JOIN pg_namespace n ON n.oid = c.relnamespace
WHERE n.nspname = $1
	AND c.relkind IN ('r', 'p', 'v', 'm')
	AND NOT c.relispartition
ORDER BY c.relname ASC";
#[derive(Debug, TryFromRow)]
pub struct GetRelations {
	pub oid: u32,
	pub name: String,
	pub is_view: bool,
	pub comment: Option<String>,
}

/// Columns of one relation with key participation
///
/// The foreign key side picks the first single hop constraint the column takes part in
pub const GET_COLUMNS: &str = "SELECT a.attname AS name,
	format_type(a.atttypid, a.atttypmod) AS sql_type,
	tn.nspname AS type_schema,
	t.typname AS type_name,
	t.typtype = 'e' AS is_enum,
	CASE WHEN t.typtype = 'd' THEN format_type(t.typbasetype, t.typtypmod) END AS domain_base,
	NOT a.attnotnull AS nullable,
	pg_get_expr(d.adbin, d.adrelid) AS default_value,
	col_description(a.attrelid, a.attnum) AS comment,
	EXISTS (
		SELECT 1
		FROM pg_index i
		WHERE i.indrelid = a.attrelid
			AND i.indisprimary
			AND a.attnum = ANY(i.indkey)
	) AS is_primary_key,
	fk.fk_schema,
	fk.fk_table,
	fk.fk_column
FROM pg_attribute a
JOIN pg_type t ON t.oid = a.atttypid
JOIN pg_namespace tn ON tn.oid = t.typnamespace
LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
LEFT JOIN LATERAL (
	SELECT fn.nspname AS fk_schema,
		fc.relname AS fk_table,
		fa.attname AS fk_column
	FROM pg_constraint con
	JOIN pg_class fc ON fc.oid = con.confrelid
	JOIN pg_namespace fn ON fn.oid = fc.relnamespace
	JOIN pg_attribute fa
		ON fa.attrelid = con.confrelid
		AND fa.attnum = con.confkey[array_position(con.conkey, a.attnum)]
	WHERE con.contype = 'f'
		AND con.conrelid = a.attrelid
		AND a.attnum = ANY(con.conkey)
	ORDER BY con.oid ASC
	LIMIT 1
) fk ON true
WHERE a.attrelid = $1
	AND a.attnum > 0
	AND NOT a.attisdropped
ORDER BY a.attnum ASC";
#[derive(Debug, TryFromRow)]
pub struct GetColumns {
	pub name: String,
	pub sql_type: String,
	pub type_schema: String,
	pub type_name: String,
	pub is_enum: bool,
	pub domain_base: Option<String>,
	pub nullable: bool,
	pub default_value: Option<String>,
	pub comment: Option<String>,
	pub is_primary_key: bool,
	pub fk_schema: Option<String>,
	pub fk_table: Option<String>,
	pub fk_column: Option<String>,
}

/// Enumerated types of one schema, labels in declaration order
pub const GET_ENUMS: &str = "SELECT t.typname AS name,
	array_agg(e.enumlabel::text ORDER BY e.enumsortorder) AS labels
FROM pg_type t
JOIN pg_namespace n ON n.oid = t.typnamespace
JOIN pg_enum e ON e.enumtypid = t.oid
WHERE n.nspname = $1
GROUP BY t.oid, t.typname
ORDER BY t.typname ASC";
#[derive(Debug, TryFromRow)]
pub struct GetEnums {
	pub name: String,
	pub labels: Vec<String>,
}

/// Functions, procedures and trigger functions of one schema
///
/// Members of installed extensions and `pg_` prefixed names are left out
pub const GET_FUNCTIONS: &str = "SELECT p.proname AS name,
	pg_get_function_arguments(p.oid) AS arguments,
	COALESCE(pg_get_function_result(p.oid), 'void') AS return_type,
	p.provolatile::text AS volatility,
	p.prosecdef AS security_definer,
	p.proisstrict AS is_strict,
	p.proretset AS returns_set,
	p.prokind::text AS prokind,
	obj_description(p.oid, 'pg_proc') AS description,
	CASE
		WHEN p.prorettype = 'trigger'::regtype
			OR EXISTS (SELECT 1 FROM pg_trigger tg WHERE tg.tgfoid = p.oid) THEN 'trigger'
		WHEN p.prokind = 'p' THEN 'procedure'
		ELSE 'function'
	END AS object_type,
	(
		SELECT string_agg(DISTINCT
			CASE
				WHEN tg.tgtype::int & 2 = 2 THEN 'BEFORE'
				WHEN tg.tgtype::int & 64 = 64 THEN 'INSTEAD OF'
				ELSE 'AFTER'
			END
			|| ' '
			|| concat_ws(' OR ',
				CASE WHEN tg.tgtype::int & 4 = 4 THEN 'INSERT' END,
				CASE WHEN tg.tgtype::int & 16 = 16 THEN 'UPDATE' END,
				CASE WHEN tg.tgtype::int & 8 = 8 THEN 'DELETE' END,
				CASE WHEN tg.tgtype::int & 32 = 32 THEN 'TRUNCATE' END)
			|| ' ON ' || tn.nspname || '.' || tc.relname,
			'; ')
		FROM pg_trigger tg
		JOIN pg_class tc ON tc.oid = tg.tgrelid
		JOIN pg_namespace tn ON tn.oid = tc.relnamespace
		WHERE tg.tgfoid = p.oid
			AND NOT tg.tgisinternal
	) AS trigger_events
FROM pg_proc p
JOIN pg_namespace n ON n.oid = p.pronamespace
WHERE n.nspname = $1
	AND p.proname NOT LIKE 'pg\\_%'
	AND NOT EXISTS (
		SELECT 1
		FROM pg_depend dep
		WHERE dep.classid = 'pg_proc'::regclass
			AND dep.objid = p.oid
			AND dep.deptype = 'e'
	)
ORDER BY p.proname ASC, p.oid ASC";
#[derive(Debug, TryFromRow)]
pub struct GetFunctions {
	pub name: String,
	pub arguments: String,
	pub return_type: String,
	pub volatility: String,
	pub security_definer: bool,
	pub is_strict: bool,
	pub returns_set: bool,
	pub prokind: String,
	pub description: Option<String>,
	pub object_type: String,
	pub trigger_events: Option<String>,
}
