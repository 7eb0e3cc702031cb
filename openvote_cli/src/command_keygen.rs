use openvote::Credential;

pub fn command_keygen(_matches: &clap::ArgMatches) {
    let credential = Credential::generate();
    let (secret, public) = (
        hex::encode(credential.secret_key().to_bytes()),
        hex::encode(credential.public_key().to_bytes()),
    );

    println!("address: {}", credential.address());
    println!("secret-key: {}", secret);
    println!("public-key: {}", public);
}
