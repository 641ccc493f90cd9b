//! On-disk layout of the dump tree and the fixed MMS naming conventions.
//!
//! Both the export and import sides must agree on this layout byte-for-byte:
//!
//! ```text
//! dump/
//!   <per-database dump files in mongodump's native format>
//!   _collections/<database>/<collection>   # plain-text sidecar exports
//!   mms_version                            # version label, single line
//! ```

/// Name of the directory `mongodump` produces under the working directory.
pub const DUMP_DIR: &str = "dump";

/// Subdirectory of the dump tree holding plain-text sidecar exports.
pub const COLLECTIONS_DIR: &str = "_collections";

/// File at the dump-tree root holding the single-line version label.
pub const MMS_VERSION_FILE: &str = "mms_version";

/// Authentication database for secured instances.
pub const AUTH_DB: &str = "admin";

/// Database holding the instance-wide MMS configuration. Removed from the
/// unpacked dump before restore so the target's configuration survives.
pub const DB_CLOUDCONF: &str = "cloudconf";

/// Database holding per-customer MMS configuration.
pub const DB_MMSCONF: &str = "mmsdbconfig";

/// Sidecar pseudo-collection recording export/import provenance.
pub const IMPORTER_LOGS: (&str, &str) = ("importer", "logs");

/// Collection whose entry count determines the schema version label.
pub const MIGRATIONS_COLLECTION: (&str, &str) = ("cloudconf", "app.migrations");

/// Collection holding customer group definitions; its group names are
/// prefixed with the case identifier to avoid collisions after merging into
/// a shared receiving instance.
pub const COLLECTION_WITH_GROUPS: (&str, &str) = ("mmsdbconfig", "config.customers");

/// Collections exported as plain-text sidecars in addition to the dump.
pub const COLLECTIONS_TO_EXPORT: [(&str, &str); 2] =
    [MIGRATIONS_COLLECTION, COLLECTION_WITH_GROUPS];

/// Sidecar collections loaded back with `mongoimport` on the import side.
/// `app.migrations` is deliberately absent: the `cloudconf` subtree is
/// removed before restore.
pub const COLLECTIONS_TO_IMPORT: [(&str, &str); 2] = [COLLECTION_WITH_GROUPS, IMPORTER_LOGS];

/// Relative paths always deleted from a dump tree before packaging.
///
/// Entries containing `*` are glob patterns expanded against the tree; the
/// rest are literal paths whose absence marks the dump as not being an MMS
/// database at all.
pub const FILES_TO_REMOVE: [&str; 6] = [
    "cloudconf/app.migrations.bson",
    "mmsdb/data.emails.bson",
    "mmsdbconfig/config.alertSettings.bson",
    "mmsdbconfig/config.customers.bson",
    "mmsdbconfig/config.users.bson",
    "mmsdblogs-*/*",
];

/// Name patterns of every database belonging to an MMS deployment.
pub const ALL_MMS_DBS: [&str; 6] = [
    r"^apiv3$",
    r"^alerts$",
    r"^cloudconf$",
    r"^importer",
    r"^mmsdb.*",
    r"^mongo-distributed-lock$",
];

/// Name patterns of system databases that are neither exported nor counted
/// as unexpected.
pub const IGNORE_DBS: [&str; 4] = [r"^admin", r"^config$", r"^local$", r"^test$"];

/// Remote host receiving shipped archives.
pub const DROPBOX_HOST: &str = "www.mongodb.com";

/// SSH port of the dropbox host.
pub const DROPBOX_PORT: u16 = 722;

/// Account-name prefix on the dropbox host; the per-case account is this
/// prefix plus the tracking identifier.
pub const FTP_PREFIX: &str = "MMS-";

/// Hosts file consulted for host aliasing.
pub const HOSTS_FILE: &str = "/etc/hosts";
