use maxi_core::parse;

fn main() {
    let maxi_data = r#"
        U:User(id:int|name|email|active:bool=true)
        ###
        U(1|"John Doe"|john.doe@example.com)
        U(2|Jane|jane@example.com|0)
    "#;

    match parse(maxi_data, "example.maxi") {
        Ok(result) => {
            let json_output = result.to_json().unwrap();
            println!("Successfully parsed MAXI to JSON:\n{json_output}");
            println!("\nRendered back to MAXI:\n{}", result.dump());
        }
        Err(e) => {
            eprintln!("Failed to parse MAXI: {:?}", miette::Report::from(e));
        }
    }
}
