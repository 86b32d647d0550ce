use clap::{Args, Parser, Subcommand, ValueEnum};
use jsontable::{Direction, Operator, PageRequest, Query, Record, RecordCollection, Store, Table};
use serde_json::Value;
use std::path::PathBuf;
use std::process;

/// jsontable CLI: query and edit JSON entity files from the command line
#[derive(Parser)]
#[command(name = "jsontable", version, about)]
struct Cli {
    /// Storage directory, or a jsontable.yaml config file (default: current directory)
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Output format
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum Aggregate {
    Min,
    Max,
    Avg,
}

/// Clauses shared by every read command
#[derive(Args)]
struct Filters {
    /// Where clause (e.g. --where "age >= 30"); values are parsed as JSON, else taken as text
    #[arg(long = "where", value_parser = parse_where)]
    wheres: Vec<(String, Operator, Value)>,
    /// Keep records whose column is in the list (e.g. --where-in id=1,2,3)
    #[arg(long = "where-in", value_parser = parse_value_list)]
    where_ins: Vec<(String, Vec<Value>)>,
    /// Drop records whose column is in the list
    #[arg(long = "where-not-in", value_parser = parse_value_list)]
    where_not_ins: Vec<(String, Vec<Value>)>,
    /// Sort (e.g. --order-by name or --order-by id:desc); later flags take priority
    #[arg(long = "order-by", value_parser = parse_order)]
    order_bys: Vec<(String, Direction)>,
    /// Only return these columns
    #[arg(long = "select")]
    selects: Vec<String>,
}

#[derive(Subcommand)]
enum Command {
    /// List the records of an entity
    List {
        entity: String,
        #[command(flatten)]
        filters: Filters,
    },

    /// Show the first matching record
    First {
        entity: String,
        #[command(flatten)]
        filters: Filters,
    },

    /// Get a single record by primary key
    Find {
        entity: String,
        id: String,
    },

    /// Count matching records
    Count {
        entity: String,
        #[command(flatten)]
        filters: Filters,
    },

    /// Compute min, max or avg over a numeric column
    Aggregate {
        function: Aggregate,
        entity: String,
        column: String,
        #[command(flatten)]
        filters: Filters,
    },

    /// List one column's values, optionally keyed by another column
    Pluck {
        entity: String,
        column: String,
        #[arg(long)]
        key: Option<String>,
        #[command(flatten)]
        filters: Filters,
    },

    /// Show one column of the first matching record
    Value {
        entity: String,
        column: String,
        #[command(flatten)]
        filters: Filters,
    },

    /// First record for each distinct value of a column
    Distinct {
        entity: String,
        column: String,
        #[command(flatten)]
        filters: Filters,
    },

    /// Show one page of matching records
    Paginate {
        entity: String,
        #[arg(long)]
        per_page: Option<usize>,
        #[arg(long)]
        page: Option<usize>,
        #[command(flatten)]
        filters: Filters,
    },

    /// Insert a new record
    Insert {
        entity: String,
        /// Field values (e.g. --field name="Alice Chen")
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
    },

    /// Update an existing record
    Update {
        entity: String,
        id: String,
        /// Field values to change (e.g. --field role=admin)
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
    },

    /// Delete a record by primary key
    Delete {
        entity: String,
        id: String,
    },

    /// List the entity files in the storage root
    Entities,
}

const OPERATORS: [&str; 8] = ["!=", "<>", ">=", "<=", "==", "=", "<", ">"];

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("Invalid key=value pair: no '=' found in '{s}'"))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

/// `column <op> value`, where the earliest (then longest) operator wins.
fn parse_where(s: &str) -> Result<(String, Operator, Value), String> {
    let (pos, op) = OPERATORS
        .iter()
        .filter_map(|op| s.find(op).map(|pos| (pos, *op)))
        .min_by(|a, b| a.0.cmp(&b.0).then(b.1.len().cmp(&a.1.len())))
        .ok_or_else(|| format!("Invalid where clause: no operator found in '{s}'"))?;

    let column = s[..pos].trim();
    if column.is_empty() {
        return Err(format!("Invalid where clause: missing column in '{s}'"));
    }
    let operator: Operator = op.parse().map_err(|e| format!("{e}"))?;
    Ok((
        column.to_string(),
        operator,
        parse_value(s[pos + op.len()..].trim()),
    ))
}

fn parse_value_list(s: &str) -> Result<(String, Vec<Value>), String> {
    let (column, list) = parse_key_value(s)?;
    let values = list
        .split(',')
        .filter(|v| !v.trim().is_empty())
        .map(|v| parse_value(v.trim()))
        .collect();
    Ok((column, values))
}

fn parse_order(s: &str) -> Result<(String, Direction), String> {
    match s.split_once(':') {
        Some((column, direction)) => {
            let direction: Direction = direction.parse().map_err(|e| format!("{e}"))?;
            Ok((column.to_string(), direction))
        }
        None => Ok((s.to_string(), Direction::Asc)),
    }
}

/// Parse as JSON (numbers, booleans, null, arrays, objects), else keep as text.
fn parse_value(s: &str) -> Value {
    serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.to_string()))
}

fn fields_to_record(fields: &[(String, String)]) -> Record {
    fields
        .iter()
        .map(|(key, val)| (key.clone(), parse_value(val)))
        .collect()
}

fn apply_filters<'a>(mut query: Query<'a>, filters: Filters) -> Query<'a> {
    for (column, operator, value) in filters.wheres {
        query = query.where_op(&column, operator, value);
    }
    for (column, values) in filters.where_ins {
        query = query.where_in(&column, values);
    }
    for (column, values) in filters.where_not_ins {
        query = query.where_not_in(&column, values);
    }
    for (column, direction) in filters.order_bys {
        query = query.order_by(&column, direction);
    }
    for column in filters.selects {
        query = query.select(&column);
    }
    query
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::open_path(&cli.root)?;
    log::debug!("Using storage root {}", store.root().display());

    let output = match cli.command {
        Command::List { entity, filters } => {
            let table = store.table(&entity);
            let records = apply_filters(table.query(), filters).get()?;
            collection_to_json(&table, records)
        }

        Command::First { entity, filters } => {
            let table = store.table(&entity);
            match apply_filters(table.query(), filters).first()? {
                Some(record) => Value::Object(table.visible(&record)),
                None => Value::Null,
            }
        }

        Command::Find { entity, id } => {
            let table = store.table(&entity);
            let record = table.query().find_or_fail(parse_value(&id))?;
            Value::Object(table.visible(&record))
        }

        Command::Count { entity, filters } => {
            let count = apply_filters(store.table(&entity).query(), filters).count()?;
            serde_json::json!({ "count": count })
        }

        Command::Aggregate {
            function,
            entity,
            column,
            filters,
        } => {
            let query = apply_filters(store.table(&entity).query(), filters);
            let result = match function {
                Aggregate::Min => query.min(&column)?,
                Aggregate::Max => query.max(&column)?,
                Aggregate::Avg => query.avg(&column)?.map(Value::from),
            };
            result.unwrap_or(Value::Null)
        }

        Command::Pluck {
            entity,
            column,
            key,
            filters,
        } => {
            let query = apply_filters(store.table(&entity).query(), filters);
            match key {
                Some(key) => Value::Object(query.pluck_keyed(&column, &key)?),
                None => Value::Array(query.pluck(&column)?),
            }
        }

        Command::Value {
            entity,
            column,
            filters,
        } => apply_filters(store.table(&entity).query(), filters)
            .value(&column)?
            .unwrap_or(Value::Null),

        Command::Distinct {
            entity,
            column,
            filters,
        } => {
            let table = store.table(&entity);
            let records = apply_filters(table.query(), filters).distinct(&column)?;
            collection_to_json(&table, records)
        }

        Command::Paginate {
            entity,
            per_page,
            page,
            filters,
        } => {
            let table = store.table(&entity);
            let mut request = PageRequest::new();
            request.per_page = per_page;
            request.page = page;
            let paginator = apply_filters(table.query(), filters).paginate(request)?;
            serde_json::json!({
                "total": paginator.total,
                "per_page": paginator.per_page,
                "current_page": paginator.current_page,
                "last_page": paginator.last_page,
                "items": collection_to_json(&table, paginator.items),
            })
        }

        Command::Insert { entity, fields } => {
            let table = store.table(&entity);
            let mut record = fields_to_record(&fields);
            table.create(&mut record)?;
            Value::Object(table.visible(&record))
        }

        Command::Update { entity, id, fields } => {
            let table = store.table(&entity);
            let mut record = table.query().find_or_fail(parse_value(&id))?;
            table.update_with(&mut record, fields_to_record(&fields))?;
            Value::Object(table.visible(&record))
        }

        Command::Delete { entity, id } => {
            let removed = store.table(&entity).destroy(parse_value(&id))?;
            serde_json::json!({ "ok": true, "deleted": id, "removed": removed })
        }

        Command::Entities => {
            let names = store.entities()?;
            serde_json::json!({
                "storage_root": store.root().display().to_string(),
                "entities": names,
            })
        }
    };

    print_output(&output, &cli.format)
}

fn collection_to_json(table: &Table<'_>, records: RecordCollection) -> Value {
    Value::Array(
        records
            .iter()
            .map(|record| Value::Object(table.visible(record)))
            .collect(),
    )
}

fn print_output(
    value: &Value,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yaml::to_string(value)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_parse_where() {
        assert_eq!(
            parse_where("age >= 30").unwrap(),
            ("age".to_string(), Operator::Ge, json!(30))
        );
        assert_eq!(
            parse_where("name=Alice Chen").unwrap(),
            ("name".to_string(), Operator::Eq, json!("Alice Chen"))
        );
        assert_eq!(
            parse_where("role<>\"admin\"").unwrap(),
            ("role".to_string(), Operator::Ne, json!("admin"))
        );
        assert!(parse_where("no operator").is_err());
        assert!(parse_where("= 3").is_err());
    }

    #[test]
    fn test_parse_value_list_and_order() {
        assert_eq!(
            parse_value_list("id=1,2, 3").unwrap(),
            ("id".to_string(), vec![json!(1), json!(2), json!(3)])
        );
        assert_eq!(
            parse_order("id:desc").unwrap(),
            ("id".to_string(), Direction::Desc)
        );
        assert_eq!(
            parse_order("name").unwrap(),
            ("name".to_string(), Direction::Asc)
        );
        assert!(parse_order("name:up").is_err());
    }

    #[test]
    fn test_fields_to_record() {
        let record = fields_to_record(&[
            ("name".into(), "Alice".into()),
            ("age".into(), "41".into()),
            ("admin".into(), "true".into()),
        ]);
        assert_eq!(
            Value::Object(record),
            json!({ "name": "Alice", "age": 41, "admin": true })
        );
    }

    #[test]
    fn test_cli_parses_filters() {
        let cli = Cli::try_parse_from([
            "jsontable",
            "--format",
            "json",
            "list",
            "users",
            "--where",
            "age>30",
            "--where-in",
            "team=red,blue",
            "--order-by",
            "name:desc",
            "--select",
            "name",
        ])
        .unwrap();
        match cli.command {
            Command::List { entity, filters } => {
                assert_eq!(entity, "users");
                assert_eq!(filters.wheres.len(), 1);
                assert_eq!(filters.where_ins[0].1.len(), 2);
                assert_eq!(filters.order_bys[0].1, Direction::Desc);
                assert_eq!(filters.selects, vec!["name"]);
            }
            _ => panic!("expected list command"),
        }
    }

    #[test]
    fn test_run_insert_update_delete() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().to_string_lossy().to_string();
        let exec = |args: &[&str]| {
            let mut argv = vec!["jsontable", "--root", root.as_str(), "--format", "json"];
            argv.extend_from_slice(args);
            run(Cli::try_parse_from(argv).unwrap())
        };

        exec(&["insert", "users", "--field", "name=Alice"]).unwrap();
        exec(&["insert", "users", "--field", "name=Bob"]).unwrap();
        exec(&["update", "users", "2", "--field", "name=Robert"]).unwrap();
        exec(&["delete", "users", "1"]).unwrap();
        assert!(exec(&["find", "users", "1"]).is_err());

        let store = Store::open_path(tmp.path()).unwrap();
        let names = store.table("users").query().pluck("name").unwrap();
        assert_eq!(names, vec![json!("Robert")]);
    }
}
