//! `pcmd meta` writes the bootstrap JSON files a fresh management
//! service loads its initial metadata from.

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PBucketItem {
    id: i64,
    name: String,
    policy_routing: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SecretItem {
    id: i64,
    access_key: String,
    secret_key: String,
    iam: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VendorItem {
    id: i64,
    name: String,
    region: String,
    access_key: String,
    access_secret: String,
    endpoint: String,
    sts_endpoint: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VendorBucketItem {
    id: i64,
    name: String,
    vendor: String,
    region: String,
}

#[derive(Debug, Serialize)]
struct ItemsFile<T> {
    items: Vec<T>,
}

/// Generate management-service bootstrap meta files.
#[derive(Debug, Args)]
pub struct MetaArgs {
    /// Directory the meta files are written into.
    #[arg(long, default_value = "./meta/")]
    pub path: PathBuf,

    /// Logical bucket name.
    #[arg(long, default_value = "pb-minio")]
    pub bucket: String,

    /// Backing vendor bucket name.
    #[arg(long = "vendor-bucket", default_value = "test-minio")]
    pub vendor_bucket: String,

    /// Vendor S3 endpoint.
    #[arg(long, default_value = "http://127.0.0.1:9000")]
    pub endpoint: String,

    /// Vendor region.
    #[arg(long, default_value = "us-east-1")]
    pub region: String,

    /// Client access key registered with the management service.
    #[arg(long, default_value = "unittest")]
    pub ak: String,

    /// Client secret key registered with the management service.
    #[arg(long, default_value = "3ewGHUIayI8cZ8qgAkoJ31gXvGqAzKmmsTLqhyM=")]
    pub sk: String,

    /// Vendor access key.
    #[arg(long = "vendor-ak", default_value = "minioadmin")]
    pub vendor_ak: String,

    /// Vendor secret key.
    #[arg(long = "vendor-sk", default_value = "minioadmin")]
    pub vendor_sk: String,
}

pub fn run(args: MetaArgs) -> anyhow::Result<()> {
    std::fs::create_dir_all(&args.path)?;

    let pbuckets = ItemsFile {
        items: vec![PBucketItem {
            id: 0,
            name: args.bucket.clone(),
            policy_routing: "{\"router\":{\"type\":\"OneRouter\"},\"bucketIds\":[0]}".to_string(),
        }],
    };
    let secrets = ItemsFile {
        items: vec![SecretItem {
            id: 0,
            access_key: args.ak.clone(),
            secret_key: args.sk.clone(),
            iam: String::new(),
        }],
    };
    let vendors = ItemsFile {
        items: vec![VendorItem {
            id: 0,
            name: "minio".to_string(),
            region: args.region.clone(),
            access_key: args.vendor_ak.clone(),
            access_secret: args.vendor_sk.clone(),
            endpoint: args.endpoint.clone(),
            sts_endpoint: String::new(),
        }],
    };
    let vendor_buckets = ItemsFile {
        items: vec![VendorBucketItem {
            id: 0,
            name: args.vendor_bucket.clone(),
            vendor: "minio".to_string(),
            region: args.region.clone(),
        }],
    };

    write_json(&args.path, "pbucket.json", &pbuckets)?;
    write_json(&args.path, "secret.json", &secrets)?;
    write_json(&args.path, "vendor.json", &vendors)?;
    write_json(&args.path, "vendor_bucket.json", &vendor_buckets)?;

    println!("wrote meta files to {}", args.path.display());
    Ok(())
}

fn write_json<T: Serialize>(dir: &PathBuf, name: &str, value: &T) -> anyhow::Result<()> {
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_string_pretty(value)?)?;
    println!("  {}", path.display());
    Ok(())
}
