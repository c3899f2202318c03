//! Declarative configuration schema handed to the host for rendering.

use super::driver_config::{
    DEFAULT_DOWNLOAD_POOL_SIZE, DEFAULT_ENCODING, DEFAULT_GENERAL_POOL_SIZE,
    DEFAULT_ROOT_FOLDER_PATH,
};

// -----------------------------------------------------------------------------
// ----- FormField -------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    String(&'static str),
    Password,
    Number(i64),
    Select {
        options: &'static [&'static str],
        default: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub help: Option<&'static str>,
}

impl FormField {
    fn new(name: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            label,
            kind,
            required: false,
            help: None,
        }
    }

    fn required(mut self) -> Self {
        self.required = true;
        self
    }

    fn with_help(mut self, help: &'static str) -> Self {
        self.help = Some(help);
        self
    }
}

// -----------------------------------------------------------------------------
// ----- Schema ----------------------------------------------------------------

pub fn form_meta() -> Vec<FormField> {
    vec![
        FormField::new(
            "root_folder_path",
            "RootFolderPath",
            FieldKind::String(DEFAULT_ROOT_FOLDER_PATH),
        ),
        FormField::new("address", "Address", FieldKind::String(""))
            .required()
            .with_help("Server address (host or host:port); port 21 is used when omitted"),
        FormField::new("encoding", "Encoding", FieldKind::String(DEFAULT_ENCODING))
            .required()
            .with_help("Charset of remote file names (e.g. UTF-8, GBK, GB2312, GB18030)"),
        FormField::new("username", "Username", FieldKind::String("")).required(),
        FormField::new("password", "Password", FieldKind::Password).required(),
        FormField::new(
            "general_pool_size",
            "GeneralPoolSize",
            FieldKind::Number(DEFAULT_GENERAL_POOL_SIZE as i64),
        )
        .with_help("Sessions for listing, mkdir, rename, move, remove and upload"),
        FormField::new(
            "download_pool_size",
            "DownloadPoolSize",
            FieldKind::Number(DEFAULT_DOWNLOAD_POOL_SIZE as i64),
        )
        .with_help("Sessions reserved for ranged downloads"),
        FormField::new(
            "connection_mode",
            "ConnectionMode",
            FieldKind::Select {
                options: &["pool", "single"],
                default: "pool",
            },
        ),
        FormField::new("connect_timeout", "ConnectTimeout", FieldKind::String("30s")),
        FormField::new("borrow_timeout", "BorrowTimeout", FieldKind::String(""))
            .with_help("Longest wait for a free session; empty waits indefinitely"),
    ]
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
