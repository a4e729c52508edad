//! System-wide constants and default paths.

/// Default base directory for husk state and layers.
pub const DEFAULT_DATA_DIR: &str = "/var/lib/husk";

/// Default directory holding `manifest.json` and the image layer archives.
pub const DEFAULT_IMAGE_DIR: &str = "unpack";

/// Name of the image manifest inside the image directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Subdirectory of the data directory holding container records.
pub const STATE_SUBDIR: &str = "containers";

/// Subdirectory of the data directory holding per-container layer sets.
pub const LAYER_SUBDIR: &str = "layers";

/// Hostname assigned inside every container's UTS namespace.
pub const CONTAINER_HOSTNAME: &str = "container";

/// Root filesystem used by `child` when no override is given.
pub const FALLBACK_ROOTFS: &str = "/tmp/newroot";

/// Number of random bytes in a container identity.
pub const ID_BYTES: usize = 6;

/// Environment variable carrying the merged root into `child`.
pub const ENV_ROOTFS: &str = "HUSK_ROOTFS";

/// Environment variable carrying the container identity into `child`.
pub const ENV_CONTAINER_ID: &str = "HUSK_CONTAINER_ID";

/// Environment variable overriding the data directory.
pub const ENV_DATA_DIR: &str = "HUSK_DATA_DIR";

/// Environment variable overriding the image directory.
pub const ENV_IMAGE_DIR: &str = "HUSK_IMAGE_DIR";

/// Setting this to `0` forces exec to join namespaces directly instead of
/// delegating to `nsenter`.
pub const ENV_EXEC_USE_NSENTER: &str = "HUSK_EXEC_USE_NSENTER";

/// External namespace-entry helper.
pub const NSENTER_BIN: &str = "nsenter";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "husk";
